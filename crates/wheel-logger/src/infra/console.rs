use std::io::{self, Write};
use wheel_core::{OutputSink, SinkError};

/// Sample lines on stdout, flushed per line so piping stays live.
pub struct ConsoleSink {
    out: io::Stdout,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }

    fn print(&mut self, line: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        writeln!(out, "{line}")?;
        out.flush()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for ConsoleSink {
    fn write_header(&mut self, header: &str) -> Result<(), SinkError> {
        Ok(self.print(header)?)
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        Ok(self.print(line)?)
    }
}
