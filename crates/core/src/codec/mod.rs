//! Stream payload decoding.
//!
//! The resolution engine treats stream payloads as opaque bytes. When it
//! needs decoded content (cross-reference streams, object streams) it asks
//! a [`StreamDecoder`]. [`FilterDecoder`] is the default and handles
//! unfiltered payloads and `FlateDecode` with PNG predictors.

pub mod predictor;

use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObject, PDFStream};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Read;

pub use predictor::png_unpredict;

/// Collaborator that turns a stream's raw payload into decoded bytes.
pub trait StreamDecoder: Send + Sync {
    fn decode(&self, stream: &PDFStream) -> Result<Bytes>;
}

/// Default decoder: identity or `FlateDecode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterDecoder;

impl StreamDecoder for FilterDecoder {
    fn decode(&self, stream: &PDFStream) -> Result<Bytes> {
        let filters = filter_names(stream)?;
        if filters.is_empty() {
            return Ok(stream.rawdata_bytes());
        }

        let mut data = stream.get_rawdata().to_vec();
        for name in &filters {
            data = match name.as_str() {
                "FlateDecode" => inflate(&data),
                other => {
                    return Err(PdfError::DecodeError(format!(
                        "unsupported filter /{}",
                        other
                    )));
                }
            };
        }

        if let Some(parms) = decode_parms(stream) {
            let int = |key: &str, default: i64| {
                parms
                    .get(key)
                    .and_then(|v| v.as_int().ok())
                    .unwrap_or(default)
                    .max(0)
                    .try_into()
                    .unwrap_or(usize::MAX)
            };
            if int("Predictor", 1) >= 10 {
                data = png_unpredict(
                    &data,
                    int("Columns", 1),
                    int("Colors", 1),
                    int("BitsPerComponent", 8),
                )?;
            }
        }

        Ok(Bytes::from(data))
    }
}

fn filter_names(stream: &PDFStream) -> Result<Vec<String>> {
    match stream.get("Filter") {
        None | Some(PDFObject::Null) => Ok(Vec::new()),
        Some(PDFObject::Name(name)) => Ok(vec![name.clone()]),
        Some(PDFObject::Array(arr)) => arr
            .iter()
            .map(|item| item.as_name().map(str::to_owned))
            .collect(),
        Some(other) => Err(PdfError::DecodeError(format!(
            "unusable /Filter of type {}",
            other.type_name()
        ))),
    }
}

fn decode_parms(stream: &PDFStream) -> Option<&HashMap<String, PDFObject>> {
    match stream.get("DecodeParms")? {
        PDFObject::Dict(d) => Some(d),
        PDFObject::Array(arr) => arr.iter().find_map(|p| p.as_dict().ok()),
        _ => None,
    }
}

/// zlib inflate. A corrupt tail yields whatever decoded cleanly before it.
fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .is_ok()
    {
        return out;
    }
    inflate_lenient(data)
}

fn inflate_lenient(data: &[u8]) -> Vec<u8> {
    use flate2::{Decompress, FlushDecompress, Status};

    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}
