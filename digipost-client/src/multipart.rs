//! Assembly of `multipart/mixed` request bodies
//!
//! The body is assembled by hand instead of handed to the transport as a
//! stream: the digest and signature filters must see the complete byte body
//! before the request goes out.

use uuid::Uuid;

/// One discrete part of a multipart body
#[derive(Debug, Clone)]
pub struct MultipartPart {
    /// Content-Disposition filename; document parts use the document uuid
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl MultipartPart {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            body,
        }
    }
}

/// An assembled multipart body with its Content-Type header value
#[derive(Debug, Clone)]
pub struct MultipartBody {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Assemble a `multipart/mixed` body, preserving part order
pub fn build_multipart_mixed(parts: &[MultipartPart]) -> MultipartBody {
    let boundary = Uuid::new_v4().simple().to_string();
    let mut body = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n", part.content_type).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: attachment; filename=\"{}\"\r\n", part.filename).as_bytes(),
        );
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.body);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    MultipartBody {
        content_type: format!("multipart/mixed; boundary={}", boundary),
        body,
    }
}
