use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
    #[error("{failed} of {total} sinks failed, first: {first}")]
    Partial {
        failed: usize,
        total: usize,
        first: Box<SinkError>,
    },
}

/// Destination for rendered header and data lines.
pub trait OutputSink: Send {
    fn write_header(&mut self, header: &str) -> Result<(), SinkError>;
    fn write_line(&mut self, line: &str) -> Result<(), SinkError>;
}

impl<T: OutputSink + ?Sized> OutputSink for Box<T> {
    fn write_header(&mut self, header: &str) -> Result<(), SinkError> {
        (**self).write_header(header)
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        (**self).write_line(line)
    }
}

/// Writes to every sink; one failing sink does not starve the others.
impl OutputSink for Vec<Box<dyn OutputSink>> {
    fn write_header(&mut self, header: &str) -> Result<(), SinkError> {
        fan_out(self, |sink| sink.write_header(header))
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        fan_out(self, |sink| sink.write_line(line))
    }
}

fn fan_out(
    sinks: &mut [Box<dyn OutputSink>],
    mut op: impl FnMut(&mut Box<dyn OutputSink>) -> Result<(), SinkError>,
) -> Result<(), SinkError> {
    let total = sinks.len();
    let mut failed = 0;
    let mut first = None;
    for sink in sinks.iter_mut() {
        if let Err(e) = op(sink) {
            failed += 1;
            if first.is_none() {
                first = Some(e);
            }
        }
    }
    match first {
        None => Ok(()),
        Some(first) => Err(SinkError::Partial {
            failed,
            total,
            first: Box::new(first),
        }),
    }
}

/// Keeps every written line in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub headers: Vec<String>,
    pub lines: Vec<String>,
}

impl OutputSink for MemorySink {
    fn write_header(&mut self, header: &str) -> Result<(), SinkError> {
        self.headers.push(header.to_string());
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Broken;

    impl OutputSink for Broken {
        fn write_header(&mut self, _header: &str) -> Result<(), SinkError> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full").into())
        }

        fn write_line(&mut self, _line: &str) -> Result<(), SinkError> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full").into())
        }
    }

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<String>>>);

    impl OutputSink for Shared {
        fn write_header(&mut self, header: &str) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(header.to_string());
            Ok(())
        }

        fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    #[test]
    fn fan_out_keeps_writing_past_a_failed_sink() {
        let shared = Shared::default();
        let mut sinks: Vec<Box<dyn OutputSink>> = vec![Box::new(Broken), Box::new(shared.clone())];

        let err = sinks.write_line("data,1").unwrap_err();
        assert!(matches!(err, SinkError::Partial { failed: 1, total: 2, .. }));
        assert_eq!(*shared.0.lock().unwrap(), vec!["data,1".to_string()]);
    }

    #[test]
    fn memory_sink_separates_headers_and_lines() {
        let mut sink = MemorySink::default();
        sink.write_header("TIME").unwrap();
        sink.write_line("12:00:00.000").unwrap();
        assert_eq!(sink.headers, vec!["TIME"]);
        assert_eq!(sink.lines, vec!["12:00:00.000"]);
    }
}
