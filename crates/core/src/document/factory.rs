//! Domain object factory.
//!
//! Every dictionary or stream that passes through
//! [`PDFDocument::build`](super::PDFDocument::build) is handed to an
//! [`ObjectFactory`], which tags it with an [`ObjectKind`] picked from its
//! type discriminator.

use crate::model::objects::{PDFObjRef, PDFObject};
use bytes::Bytes;
use std::collections::HashMap;

/// Closed set of domain object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Catalog,
    Pages,
    Page,
    Font,
    XObject,
    Annotation,
    ObjectStream,
    XRefStream,
    /// Any dictionary without a recognised discriminator.
    Generic,
}

/// A built (possibly partially) object tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A primitive, an unresolved reference, or a value whose expansion
    /// was deferred.
    Object(PDFObject),
    Array(Vec<Node>),
    Dict(Box<DomainObject>),
}

impl Node {
    pub const fn as_object(&self) -> Option<&PDFObject> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&DomainObject> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// The reference left in place, if this node was not expanded.
    pub const fn as_ref(&self) -> Option<PDFObjRef> {
        match self {
            Self::Object(PDFObject::Ref(r)) => Some(*r),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        self.as_object().and_then(|o| o.as_name().ok())
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_object().and_then(|o| o.as_int().ok())
    }
}

/// A dictionary or stream after it went through the factory.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainObject {
    pub kind: ObjectKind,
    pub attrs: HashMap<String, Node>,
    /// Raw, undecoded payload when the source was a stream.
    pub data: Option<Bytes>,
}

impl DomainObject {
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.attrs.get(key)
    }

    pub const fn is_stream(&self) -> bool {
        self.data.is_some()
    }
}

/// Turns a dictionary (or stream dictionary) into a domain object.
pub trait ObjectFactory: Send + Sync {
    fn classify(&self, attrs: &HashMap<String, Node>) -> ObjectKind;

    fn make(&self, attrs: HashMap<String, Node>, data: Option<Bytes>) -> DomainObject {
        DomainObject {
            kind: self.classify(&attrs),
            attrs,
            data,
        }
    }
}

/// Default factory keyed on `/Type`, with `/Subtype` as a fallback for
/// annotations and XObjects that omit their type.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeFactory;

const ANNOTATION_SUBTYPES: &[&str] = &[
    "Text",
    "Link",
    "FreeText",
    "Line",
    "Square",
    "Circle",
    "Polygon",
    "PolyLine",
    "Highlight",
    "Underline",
    "Squiggly",
    "StrikeOut",
    "Stamp",
    "Caret",
    "Ink",
    "Popup",
    "FileAttachment",
    "Sound",
    "Movie",
    "Widget",
    "Screen",
    "PrinterMark",
    "TrapNet",
    "Watermark",
    "3D",
    "Redact",
];

impl ObjectFactory for TypeFactory {
    fn classify(&self, attrs: &HashMap<String, Node>) -> ObjectKind {
        let ty = attrs.get("Type").and_then(Node::as_name);
        let subtype = attrs.get("Subtype").and_then(Node::as_name);
        match (ty, subtype) {
            (Some("Catalog"), _) => ObjectKind::Catalog,
            (Some("Pages"), _) => ObjectKind::Pages,
            (Some("Page"), _) => ObjectKind::Page,
            (Some("Font"), _) => ObjectKind::Font,
            (Some("XObject"), _) => ObjectKind::XObject,
            (Some("Annot"), _) => ObjectKind::Annotation,
            (Some("ObjStm"), _) => ObjectKind::ObjectStream,
            (Some("XRef"), _) => ObjectKind::XRefStream,
            (None, Some("Image" | "Form")) => ObjectKind::XObject,
            (None, Some(s)) if ANNOTATION_SUBTYPES.contains(&s) => ObjectKind::Annotation,
            _ => ObjectKind::Generic,
        }
    }
}
