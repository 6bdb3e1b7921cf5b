//! Tests for PDFDocument object resolution.
//!
//! Covers the three location tiers (index offset, object stream, body
//! scan), memoization, null substitution, reference-chain limits, and
//! lazy/eager tree building.

mod common;

use common::{PdfBuilder, append_update, capture_events};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::Level;
use xrefine_core::codec::StreamDecoder;
use xrefine_core::document::{DomainObject, Node, ObjectFactory, ObjectKind};
use xrefine_core::{ParseOptions, PDFDocument, PDFObjRef, PDFObject, PDFStream, PdfError};

fn simple_tree() -> PdfBuilder {
    PdfBuilder::new(1)
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>")
}

/// Catalog, an object stream holding objects 2 and 3, and a
/// cross-reference stream indexing all of it.
fn objstm_pdf() -> Vec<u8> {
    let members = [
        "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 612 792] >>",
        "<< /Type /Page /Parent 2 0 R >>",
    ];
    let header = format!("2 0 3 {} ", members[0].len() + 1);
    let first = header.len();
    let content = format!("{}{} {}", header, members[0], members[1]);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    let packed = encoder.finish().unwrap();

    let mut out = b"%PDF-1.5\n".to_vec();
    let catalog_at = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let objstm_at = out.len();
    out.extend_from_slice(
        format!(
            "5 0 obj\n<< /Type /ObjStm /N 2 /First {} /Filter /FlateDecode /Length {} >>\nstream\n",
            first,
            packed.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&packed);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    let xref_at = out.len();
    let rows: [(u8, usize, u16); 7] = [
        (0, 0, 65535),
        (1, catalog_at, 0),
        (2, 5, 0),
        (2, 5, 1),
        (0, 0, 0),
        (1, objstm_at, 0),
        (1, xref_at, 0),
    ];
    out.extend_from_slice(&xref_stream_object(6, &rows, 1));
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_at).as_bytes());
    out
}

fn xref_stream_object(objid: u32, rows: &[(u8, usize, u16)], root: u32) -> Vec<u8> {
    xref_stream_with(objid, rows, root, "")
}

/// Like `xref_stream_object`, with `extra` spliced into the stream dictionary.
fn xref_stream_with(objid: u32, rows: &[(u8, usize, u16)], root: u32, extra: &str) -> Vec<u8> {
    let mut table = Vec::new();
    for &(kind, field1, field2) in rows {
        table.push(kind);
        table.extend_from_slice(&(field1 as u32).to_be_bytes());
        table.extend_from_slice(&field2.to_be_bytes());
    }
    let mut out = format!(
        "{} 0 obj\n<< /Type /XRef /Size {} /W [1 4 2] /Root {} 0 R /Length {} {}>>\nstream\n",
        objid,
        rows.len(),
        root,
        table.len(),
        extra
    )
    .into_bytes();
    out.extend_from_slice(&table);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    out
}

#[test]
fn test_open_simple_document() {
    let pdf = simple_tree().build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    assert_eq!(doc.root(), PDFObjRef::new(1, 0));
    assert_eq!(doc.header().unwrap().version, "1.4");
    assert_eq!(doc.trailer().xrefs.len(), 1);

    let catalog = doc.catalog();
    let catalog = catalog.as_dict().unwrap();
    assert_eq!(catalog.kind, ObjectKind::Catalog);
    // Shallow: nested references stay in place.
    assert_eq!(catalog.get("Pages").unwrap().as_ref(), Some(PDFObjRef::new(2, 0)));
}

#[test]
fn test_open_from_file() {
    let pdf = simple_tree().build();
    let path = std::env::temp_dir().join(format!("xrefine-open-{}.pdf", std::process::id()));
    std::fs::write(&path, &pdf.bytes).unwrap();
    let mut doc = PDFDocument::open(&path).unwrap();
    assert!(doc.locate_object(3, 0).attrs().is_some());
    drop(doc);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_resolution_is_idempotent() {
    let pdf = simple_tree().build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();

    let first = doc.locate_object(2, 0);
    let count = doc.registry().len();
    let second = doc.locate_object(2, 0);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(doc.registry().len(), count);
}

#[test]
fn test_generation_must_match() {
    let pdf = simple_tree().build();
    let mut doc = PDFDocument::new_with_options(
        &pdf.bytes,
        ParseOptions::new().with_brute_force(false),
    )
    .unwrap();
    assert!(doc.locate_object(2, 1).is_null());
    assert!(!doc.locate_object(2, 0).is_null());
}

#[test]
fn test_cyclic_references_terminate() {
    let pdf = simple_tree()
        .object(4, "<< /Self 4 0 R /Name /Loop >>")
        .build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();

    let tree = doc.build(&PDFObject::Ref(PDFObjRef::new(1, 0)), false);
    let pages = tree.as_dict().unwrap().get("Pages").unwrap().as_dict().unwrap();
    assert_eq!(pages.kind, ObjectKind::Pages);
    let kids = pages.get("Kids").unwrap().as_array().unwrap();
    let page = kids[0].as_dict().unwrap();
    assert_eq!(page.kind, ObjectKind::Page);
    // The parent is already on the path, so it stays a reference.
    assert_eq!(page.get("Parent").unwrap().as_ref(), Some(PDFObjRef::new(2, 0)));

    let looped = doc.build(&PDFObject::Ref(PDFObjRef::new(4, 0)), false);
    let looped = looped.as_dict().unwrap();
    assert_eq!(looped.get("Self").unwrap().as_ref(), Some(PDFObjRef::new(4, 0)));
    assert_eq!(looped.get("Name").unwrap().as_name(), Some("Loop"));
}

#[test]
fn test_visited_set_is_respected() {
    let pdf = simple_tree().build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    let mut visited = vec![PDFObjRef::new(2, 0)];
    let tree = doc.build_with(&PDFObject::Ref(PDFObjRef::new(1, 0)), &mut visited, false);
    assert_eq!(
        tree.as_dict().unwrap().get("Pages").unwrap().as_ref(),
        Some(PDFObjRef::new(2, 0))
    );
    assert_eq!(visited, vec![PDFObjRef::new(2, 0)]);
}

#[test]
fn test_lazy_build_defers_entries() {
    let pdf = simple_tree().build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    let root = PDFObject::Ref(PDFObjRef::new(1, 0));

    let lazy = doc.build(&root, true);
    let catalog = lazy.as_dict().unwrap();
    assert_eq!(catalog.get("Pages").unwrap().as_ref(), Some(PDFObjRef::new(2, 0)));

    let pages = doc.expand(catalog, "Pages").unwrap();
    let pages = pages.as_dict().unwrap();
    assert_eq!(pages.kind, ObjectKind::Pages);
    assert!(matches!(pages.get("Kids"), Some(Node::Object(PDFObject::Array(_)))));
    assert!(doc.expand(catalog, "Missing").is_none());

    let eager = doc.build(&root, false);
    let kids = eager
        .as_dict()
        .unwrap()
        .get("Pages")
        .unwrap()
        .as_dict()
        .unwrap()
        .get("Kids")
        .unwrap()
        .as_array()
        .unwrap()
        .to_vec();
    assert_eq!(kids.len(), 1);
    assert_eq!(kids[0].as_dict().unwrap().kind, ObjectKind::Page);
}

#[test]
fn test_arrays_expand_even_when_lazy() {
    let pdf = simple_tree().object(5, "[2 0 R 7]").build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    let node = doc.build(&PDFObject::Ref(PDFObjRef::new(5, 0)), true);
    let items = node.as_array().unwrap();
    assert_eq!(items[0].as_dict().unwrap().kind, ObjectKind::Pages);
    assert_eq!(items[1].as_int(), Some(7));
}

#[test]
fn test_stream_build_keeps_raw_payload() {
    let pdf = simple_tree()
        .object(4, "<< /Length 5 /Type /XObject /Subtype /Form >>\nstream\nq Q  \nendstream")
        .build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    let node = doc.build(&PDFObject::Ref(PDFObjRef::new(4, 0)), false);
    let form = node.as_dict().unwrap();
    assert_eq!(form.kind, ObjectKind::XObject);
    assert!(form.is_stream());
    assert_eq!(form.data.as_deref(), Some(&b"q Q  "[..]));
}

#[test]
fn test_wrong_offset_falls_back_to_scan() {
    let pdf = simple_tree()
        .object(7, "(seven)")
        .wrong_offset(7)
        .build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    assert_eq!(*doc.locate_object(7, 0), PDFObject::String(b"seven".to_vec()));
}

#[test]
fn test_unlisted_object_found_by_scan() {
    let pdf = simple_tree().object(8, "42").unlisted(8).build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    assert_eq!(doc.locate_object(8, 0).as_int().unwrap(), 42);
}

#[test]
fn test_scan_disabled_gives_null() {
    let pdf = simple_tree().object(8, "42").unlisted(8).build();
    let mut doc =
        PDFDocument::new_with_options(&pdf.bytes, ParseOptions::new().with_brute_force(false))
            .unwrap();
    assert!(doc.locate_object(8, 0).is_null());
}

#[test]
fn test_missing_object_is_null_and_logged() {
    let pdf = simple_tree().build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();

    let (obj, events) = capture_events(|| doc.locate_object(99, 0));
    assert!(obj.is_null());
    assert!(doc.registry().is_registered(99, 0));
    assert_eq!(events.with_field(Level::WARN, "objid", "99").len(), 1);

    // Memoized: no second warning.
    let (again, events) = capture_events(|| doc.locate_object(99, 0));
    assert!(again.is_null());
    assert!(events.at_level(Level::WARN).is_empty());

    // Other objects are unaffected.
    assert!(!doc.locate_object(3, 0).is_null());
}

#[test]
fn test_deep_reference_chain() {
    let mut builder = PdfBuilder::new(1).object(1, "<< /Type /Catalog >>");
    for objid in 10..160 {
        builder = builder.object(objid, &format!("{} 0 R", objid + 1));
    }
    builder = builder.object(160, "(end)");
    let pdf = builder.build();

    let start = PDFObject::Ref(PDFObjRef::new(10, 0));
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    assert!(matches!(
        doc.deep_obj_by_ref(&start, 100),
        Err(PdfError::DepthExceeded(100))
    ));
    assert!(matches!(
        doc.deep_obj_by_ref_default(&start),
        Err(PdfError::DepthExceeded(100))
    ));

    let mut doc =
        PDFDocument::new_with_options(&pdf.bytes, ParseOptions::new().with_max_depth(200))
            .unwrap();
    let end = doc.deep_obj_by_ref_default(&start).unwrap();
    assert_eq!(*end, PDFObject::String(b"end".to_vec()));
}

#[test]
fn test_deep_obj_by_ref_passes_direct_values() {
    let pdf = simple_tree().build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    let value = doc.deep_obj_by_ref(&PDFObject::Int(5), 0).unwrap();
    assert_eq!(*value, PDFObject::Int(5));
}

#[test]
fn test_no_xref_uses_trailer() {
    let pdf = simple_tree().build_without_xref(true);
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    assert!(doc.trailer().xrefs.is_empty());
    assert_eq!(doc.root(), PDFObjRef::new(1, 0));
    assert!(doc.locate_object(3, 0).attrs().unwrap().contains_key("MediaBox"));
}

#[test]
fn test_no_xref_no_trailer_finds_catalog() {
    let pdf = PdfBuilder::new(0)
        .object(4, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(9, "<< /Type /Catalog /Pages 4 0 R >>")
        .build_without_xref(false);
    let doc = PDFDocument::new(&pdf.bytes).unwrap();
    assert_eq!(doc.root(), PDFObjRef::new(9, 0));
}

#[test]
fn test_no_root_anywhere_is_an_error() {
    let pdf = PdfBuilder::new(0)
        .object(1, "<< /Type /Pages >>")
        .build_without_xref(false);
    assert!(PDFDocument::new(&pdf.bytes).is_err());
}

#[test]
fn test_missing_header_warns() {
    let data = b"1 0 obj << /Type /Catalog >> endobj\ntrailer << /Root 1 0 R >>\n";
    let (doc, events) = capture_events(|| PDFDocument::new(&data[..]));
    let doc = doc.unwrap();
    assert!(doc.header().is_none());
    assert_eq!(doc.root(), PDFObjRef::new(1, 0));
    assert!(!events.at_level(Level::WARN).is_empty());
}

#[test]
fn test_object_stream_resolution() {
    let mut doc = PDFDocument::new(objstm_pdf()).unwrap();
    assert_eq!(doc.root(), PDFObjRef::new(1, 0));

    let page = doc.locate_object(3, 0);
    assert_eq!(page.attrs().unwrap().get("Type").unwrap().as_name().unwrap(), "Page");
    // The sibling came out of the same unpack.
    assert!(doc.registry().is_registered(2, 0));

    let pages = doc.pages().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].pageid, Some(PDFObjRef::new(3, 0)));
    assert_eq!(pages[0].mediabox(&mut doc), Some([0.0, 0.0, 612.0, 792.0]));
}

#[test]
fn test_object_stream_found_by_scan() {
    // Same file with the index cut off: the scan unpacks the object
    // stream it walks over.
    let full = objstm_pdf();
    let cut = full.windows(7).rposition(|w| w == b"6 0 obj").unwrap();
    let mut data = full[..cut].to_vec();
    data.extend_from_slice(b"trailer << /Root 1 0 R >>\n");

    let mut doc = PDFDocument::new(data).unwrap();
    let page = doc.locate_object(3, 0);
    assert_eq!(page.attrs().unwrap().get("Type").unwrap().as_name().unwrap(), "Page");
}

#[test]
fn test_self_contained_compressed_entry_terminates() {
    let mut out = b"%PDF-1.5\n".to_vec();
    let catalog_at = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
    let xref_at = out.len();
    let rows: [(u8, usize, u16); 5] =
        [(0, 0, 65535), (1, catalog_at, 0), (2, 3, 0), (2, 3, 1), (1, xref_at, 0)];
    out.extend_from_slice(&xref_stream_object(4, &rows, 1));
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_at).as_bytes());

    let mut doc = PDFDocument::new(out).unwrap();
    assert!(doc.locate_object(3, 0).is_null());
    assert!(doc.locate_object(2, 0).is_null());
    assert!(!doc.locate_object(1, 0).is_null());
}

#[test]
fn test_object_stream_slot_offset_overflow_is_skipped() {
    let members = ["<< /Type /Pages /Kids [] /Count 0 >>", "<< /Type /Page >>"];
    let header = "2 0 3 18446744073709551615 ";
    let content = format!("{}{} {}", header, members[0], members[1]);
    let objstm = format!(
        "<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n{}\nendstream",
        header.len(),
        content.len(),
        content
    );
    let pdf = PdfBuilder::new(1)
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(5, &objstm)
        .build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();

    assert!(doc.locate_object(3, 0).is_null());
    let pages = doc.locate_object(2, 0);
    assert_eq!(pages.attrs().unwrap().get("Type").unwrap().as_name().unwrap(), "Pages");
}

#[test]
fn test_xref_stream_index_near_i64_max_is_cut_short() {
    let mut out = b"%PDF-1.5\n".to_vec();
    let catalog_at = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
    let xref_at = out.len();
    let rows: [(u8, usize, u16); 4] = [(0, 0, 65535), (1, catalog_at, 0), (1, 0, 0), (1, 0, 0)];
    out.extend_from_slice(&xref_stream_with(
        4,
        &rows,
        1,
        "/Index [0 2 9223372036854775807 2] ",
    ));
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_at).as_bytes());

    let mut doc = PDFDocument::new(out).unwrap();
    assert_eq!(doc.root(), PDFObjRef::new(1, 0));
    assert!(!doc.locate_object(1, 0).is_null());
}

#[test]
fn test_xref_stream_with_overflowing_predictor_falls_back_to_scan() {
    let mut out = b"%PDF-1.5\n".to_vec();
    let catalog_at = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
    let xref_at = out.len();
    let rows: [(u8, usize, u16); 2] = [(0, 0, 65535), (1, catalog_at, 0)];
    out.extend_from_slice(&xref_stream_with(
        2,
        &rows,
        1,
        "/DecodeParms << /Predictor 12 /Columns 4611686018427387904 >> ",
    ));
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_at).as_bytes());

    let mut doc = PDFDocument::new(out).unwrap();
    assert_eq!(doc.root(), PDFObjRef::new(1, 0));
    assert!(!doc.locate_object(1, 0).is_null());
}

#[test]
fn test_incremental_update_prefers_newest() {
    let base = PdfBuilder::new(1)
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Rotate 0 >>")
        .build();
    let mut bytes = base.bytes.clone();
    append_update(
        &mut bytes,
        &[(3, "<< /Type /Page /Parent 2 0 R /Rotate 90 >>")],
        1,
        base.xref_offset.unwrap(),
    );

    let mut doc = PDFDocument::new(bytes).unwrap();
    assert_eq!(doc.trailer().xrefs.len(), 2);
    let page = doc.locate_object(3, 0);
    assert_eq!(page.attrs().unwrap().get("Rotate"), Some(&PDFObject::Int(90)));
    assert_eq!(doc.pages().unwrap()[0].rotate(), 90);
}

#[test]
fn test_broken_prev_link_ends_chain() {
    let pdf = simple_tree().trailer("/Prev 0").build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap();
    assert_eq!(doc.trailer().xrefs.len(), 1);
    assert!(!doc.locate_object(3, 0).is_null());
}

#[test]
fn test_resync_skips_garbage() {
    let builder = PdfBuilder::new(1)
        .object(1, "<< /Type /Catalog >>")
        .object(2, "<< /A 1 >>")
        .garbage_after(2, b"@@@ ) garbage")
        .object(7, "(found)");
    let pdf = builder.build_without_xref(true);

    let mut strict = PDFDocument::new(&pdf.bytes).unwrap();
    let (obj, events) = capture_events(|| strict.locate_object(7, 0));
    assert!(obj.is_null());
    assert_eq!(events.with_field(Level::WARN, "objid", "7").len(), 1);

    let mut lenient =
        PDFDocument::new_with_options(&pdf.bytes, ParseOptions::new().with_resync(true)).unwrap();
    assert_eq!(
        *lenient.locate_object(7, 0),
        PDFObject::String(b"found".to_vec())
    );
}

struct EverythingGeneric;

impl ObjectFactory for EverythingGeneric {
    fn classify(&self, _attrs: &HashMap<String, Node>) -> ObjectKind {
        ObjectKind::Generic
    }
}

#[test]
fn test_custom_factory() {
    let pdf = simple_tree().build();
    let mut doc = PDFDocument::new(&pdf.bytes).unwrap().with_factory(EverythingGeneric);
    let catalog = doc.catalog();
    let catalog: &DomainObject = catalog.as_dict().unwrap();
    assert_eq!(catalog.kind, ObjectKind::Generic);
}

struct RefusingDecoder;

impl StreamDecoder for RefusingDecoder {
    fn decode(&self, _stream: &PDFStream) -> xrefine_core::Result<bytes::Bytes> {
        Err(PdfError::DecodeError("refused".into()))
    }
}

#[test]
fn test_decoder_failure_degrades_to_null() {
    let mut doc = PDFDocument::new(objstm_pdf())
        .unwrap()
        .with_decoder(RefusingDecoder);
    assert!(doc.locate_object(3, 0).is_null());
    assert!(!doc.locate_object(1, 0).is_null());
}
