//! Shared helpers for integration tests: an in-memory PDF writer with
//! computed xref offsets, and a tracing layer that records emitted events.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// A document produced by [`PdfBuilder`].
#[derive(Debug, Clone)]
pub struct BuiltPdf {
    pub bytes: Vec<u8>,
    /// Byte offset of each `N 0 obj` header.
    pub offsets: HashMap<u32, usize>,
    /// Byte offset of the `xref` keyword, if one was written.
    pub xref_offset: Option<usize>,
}

/// Writes classic-xref PDFs from object bodies.
#[derive(Debug, Clone, Default)]
pub struct PdfBuilder {
    objects: Vec<(u32, Vec<u8>)>,
    root: u32,
    trailer_extra: String,
    wrong_offsets: Vec<u32>,
    unlisted: Vec<u32>,
    garbage_after: HashMap<u32, Vec<u8>>,
}

impl PdfBuilder {
    pub fn new(root: u32) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    pub fn object(mut self, objid: u32, body: &str) -> Self {
        self.objects.push((objid, body.as_bytes().to_vec()));
        self
    }

    pub fn raw_object(mut self, objid: u32, body: Vec<u8>) -> Self {
        self.objects.push((objid, body));
        self
    }

    /// Extra entries appended to the trailer dictionary.
    pub fn trailer(mut self, extra: &str) -> Self {
        self.trailer_extra = extra.to_string();
        self
    }

    /// Record an offset for `objid` that points at the xref keyword.
    pub fn wrong_offset(mut self, objid: u32) -> Self {
        self.wrong_offsets.push(objid);
        self
    }

    /// Write `objid` into the body but leave it out of the xref table.
    pub fn unlisted(mut self, objid: u32) -> Self {
        self.unlisted.push(objid);
        self
    }

    /// Insert unparsable bytes right after `objid`.
    pub fn garbage_after(mut self, objid: u32, junk: &[u8]) -> Self {
        self.garbage_after.insert(objid, junk.to_vec());
        self
    }

    fn body(&self) -> (Vec<u8>, HashMap<u32, usize>) {
        let mut out = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n".to_vec();
        let mut offsets = HashMap::new();
        for (objid, body) in &self.objects {
            offsets.insert(*objid, out.len());
            out.extend_from_slice(format!("{} 0 obj\n", objid).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
            if let Some(junk) = self.garbage_after.get(objid) {
                out.extend_from_slice(junk);
                out.push(b'\n');
            }
        }
        (out, offsets)
    }

    pub fn build(&self) -> BuiltPdf {
        let (mut out, offsets) = self.body();
        let size = self.objects.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1;
        let xref_offset = out.len();

        out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
        for objid in 0..size {
            let listed = offsets.get(&objid).filter(|_| !self.unlisted.contains(&objid));
            match listed {
                Some(_) if self.wrong_offsets.contains(&objid) => {
                    out.extend_from_slice(format!("{:010} 00000 n \n", xref_offset).as_bytes())
                }
                Some(offset) => {
                    out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes())
                }
                None => out.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root {} 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                size, self.root, self.trailer_extra, xref_offset
            )
            .as_bytes(),
        );

        BuiltPdf {
            bytes: out,
            offsets,
            xref_offset: Some(xref_offset),
        }
    }

    /// Body only, followed by a bare trailer and no index.
    pub fn build_without_xref(&self, with_trailer: bool) -> BuiltPdf {
        let (mut out, offsets) = self.body();
        if with_trailer {
            out.extend_from_slice(format!("trailer\n<< /Root {} 0 R >>\n", self.root).as_bytes());
        }
        out.extend_from_slice(b"%%EOF\n");
        BuiltPdf {
            bytes: out,
            offsets,
            xref_offset: None,
        }
    }
}

/// Append an incremental update holding `objects`, chained to `prev`.
pub fn append_update(base: &mut Vec<u8>, objects: &[(u32, &str)], root: u32, prev: usize) {
    let mut rows = Vec::new();
    for (objid, body) in objects {
        rows.push((*objid, base.len()));
        base.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", objid, body).as_bytes());
    }
    let size = objects.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1;
    let xref_offset = base.len();
    base.extend_from_slice(b"xref\n");
    for (objid, offset) in rows {
        base.extend_from_slice(format!("{} 1\n{:010} 00000 n \n", objid, offset).as_bytes());
    }
    base.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root {} 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            size, root, prev, xref_offset
        )
        .as_bytes(),
    );
}

/// An event recorded by [`EventCaptureLayer`].
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// Shared storage for captured events.
#[derive(Debug, Clone, Default)]
pub struct EventStore(Arc<Mutex<Vec<CapturedEvent>>>);

impl EventStore {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.level == level).collect()
    }

    /// Events at `level` carrying `field == value`.
    pub fn with_field(&self, level: Level, field: &str, value: &str) -> Vec<CapturedEvent> {
        self.at_level(level)
            .into_iter()
            .filter(|e| e.fields.get(field).map(String::as_str) == Some(value))
            .collect()
    }
}

struct FieldVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut HashMap<String, String>,
}

impl Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = format!("{:?}", value);
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }
}

/// A tracing `Layer` that records every event into an [`EventStore`].
pub struct EventCaptureLayer {
    store: EventStore,
}

impl<S: Subscriber> Layer<S> for EventCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor {
            message: &mut message,
            fields: &mut fields,
        });
        self.store.0.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields,
        });
    }
}

/// Run `f` with a subscriber that captures its events.
pub fn capture_events<T>(f: impl FnOnce() -> T) -> (T, EventStore) {
    let store = EventStore::default();
    let subscriber = tracing_subscriber::registry().with(EventCaptureLayer {
        store: store.clone(),
    });
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, store)
}
