/// Default capacity of the read loop's reusable buffer.
pub const DEFAULT_READ_BUFFER_CAPACITY: usize = 512;

/// Configuration for a duplex link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Name used for loop thread names and log fields.
    pub name: String,
    /// Initial capacity of the read loop buffer. Default: 512 bytes.
    pub read_buffer_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name: "rpclink".to_string(),
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
        }
    }
}

impl LinkConfig {
    /// Override the link name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the read buffer capacity.
    pub fn with_read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity;
        self
    }
}
