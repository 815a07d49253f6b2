/// A git blob: opaque file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// A blob's content is just its raw bytes; parsing cannot fail.
    pub fn parse(content: &[u8]) -> Self {
        Self {
            data: content.to_vec(),
        }
    }

    pub fn serialize_content(&self) -> &[u8] {
        &self.data
    }

    /// Logical size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
