use std::fs::File;
use std::ops::Deref;

/// The bytes of a trace file, either memory mapped or read into memory
pub enum TraceBuffer {
    #[cfg(unix)]
    Mapped(memmap2::Mmap),
    Owned(Vec<u8>),
}

impl Deref for TraceBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            #[cfg(unix)]
            TraceBuffer::Mapped(m) => &m[..],
            TraceBuffer::Owned(v) => &v[..],
        }
    }
}

/// Loads a trace file for simulation
pub fn load_trace(file: File) -> Result<TraceBuffer, String> {
    // Compatibility on other systems
    #[cfg(not(unix))]
    {
        use std::io::Read;
        let mut file = file;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(|e| format!("Couldn't read the trace file: {e}"))?;
        Ok(TraceBuffer::Owned(buf))
    }
    // Memory map the file on unix systems, the simulator only ever reads it front to back
    #[cfg(unix)]
    {
        use memmap2::{Advice, Mmap};
        let len = file.metadata().map_err(|e| format!("Couldn't read the trace file's metadata: {e}"))?.len();
        // Mapping an empty file fails on some platforms
        if len == 0 {
            return Ok(TraceBuffer::Owned(Vec::new()));
        }
        // Safety: the trace is treated as read-only input for the lifetime of the mapping
        unsafe {
            let m = Mmap::map(&file).map_err(|e| format!("Couldn't memory map the file: {e}"))?;
            m.advise(Advice::Sequential).map_err(|e| format!("Failed to provide access advice to the OS, {e}"))?;
            Ok(TraceBuffer::Mapped(m))
        }
    }
}
