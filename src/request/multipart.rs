//! `multipart/form-data` body writer.

use bytes::{BufMut as _, Bytes, BytesMut};
use rand::RngExt as _;

const HEX: [u8; 16] = *b"0123456789abcdef";

/// Generates a random boundary: a fixed prefix and 32 hex digits.
#[must_use]
pub(crate) fn boundary() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes[..]);

    let mut s = String::with_capacity(38);
    s.push_str("flare-");
    for b in bytes {
        s.push(char::from(HEX[(b >> 4) as usize]));
        s.push(char::from(HEX[(b & 0x0F) as usize]));
    }
    s
}

fn escape(name: &str) -> String {
    name.replace('\r', "%0D")
        .replace('\n', "%0A")
        .replace('"', "%22")
}

pub(crate) struct MultipartWriter {
    boundary: String,
    buf: BytesMut,
}

impl MultipartWriter {
    pub(crate) fn new() -> Self {
        Self::with_boundary(boundary())
    }

    pub(crate) fn with_boundary(boundary: String) -> Self {
        Self {
            boundary,
            buf: BytesMut::new(),
        }
    }

    pub(crate) fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn open(&mut self, disposition: &str) {
        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_bytes());
        self.buf.put_slice(b"\r\nContent-Disposition: ");
        self.buf.put_slice(disposition.as_bytes());
        self.buf.put_slice(b"\r\n");
    }

    /// Appends a text field.
    pub(crate) fn text(&mut self, name: &str, value: &str) {
        self.open(&format!("form-data; name=\"{}\"", escape(name)));
        self.buf.put_slice(b"\r\n");
        self.buf.put_slice(value.as_bytes());
        self.buf.put_slice(b"\r\n");
    }

    /// Appends a binary part.
    pub(crate) fn part(&mut self, name: &str, filename: Option<&str>, content: &[u8]) {
        let disposition = match filename {
            Some(filename) => format!(
                "form-data; name=\"{}\"; filename=\"{}\"",
                escape(name),
                escape(filename)
            ),
            None => format!("form-data; name=\"{}\"", escape(name)),
        };
        self.open(&disposition);
        self.buf
            .put_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        self.buf.put_slice(content);
        self.buf.put_slice(b"\r\n");
    }

    pub(crate) fn finish(mut self) -> Bytes {
        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_bytes());
        self.buf.put_slice(b"--\r\n");
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_is_random() {
        let a = boundary();
        assert_eq!(a.len(), 38);
        assert!(a.starts_with("flare-"));
        assert_ne!(a, boundary());
    }

    #[test]
    fn test_writer_layout() {
        let mut writer = MultipartWriter::with_boundary("b".to_owned());
        writer.text("title", "hi");
        writer.part("file", Some("a\"b.txt"), b"data");
        assert_eq!(writer.content_type(), "multipart/form-data; boundary=b");

        let body = writer.finish();
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            "--b\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhi\r\n\
             --b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a%22b.txt\"\r\n\
             Content-Type: application/octet-stream\r\n\r\ndata\r\n--b--\r\n"
        );
    }
}
