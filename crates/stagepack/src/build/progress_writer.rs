//! Log writer that keeps tracing output above the progress bars

use std::io::{self, Write};

use indicatif::MultiProgress;
use tracing_subscriber::fmt::MakeWriter;

/// Writer that suspends the progress bars while a log line is written
pub struct ProgressWriter {
    multi: MultiProgress,
}

impl ProgressWriter {
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl MakeWriter<'_> for ProgressWriter {
    type Writer = Self;

    fn make_writer(&self) -> Self::Writer {
        Self {
            multi: self.multi.clone(),
        }
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().lock().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Create a `MakeWriter` bound to `multi`
pub fn make_writer(multi: &MultiProgress) -> ProgressWriter {
    ProgressWriter::new(multi.clone())
}
