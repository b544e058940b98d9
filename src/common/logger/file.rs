use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::Path,
    sync::{Arc, Mutex},
};

/// Strips ANSI escape sequences so the log file stays plain text.
pub fn strip_ansi_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
        } else if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Appends to a log file and periodically trims it back down to the most
/// recent `max_lines` lines, so the file never grows without bound.
#[derive(Clone)]
pub struct CappedFileWriter {
    path: String,
    max_lines: u32,
    appended: Arc<Mutex<u32>>,
}

impl CappedFileWriter {
    pub fn new(path: String, max_lines: u32) -> Self {
        Self {
            path,
            max_lines,
            appended: Arc::new(Mutex::new(0)),
        }
    }

    fn trim(&self) -> io::Result<()> {
        if !Path::new(&self.path).exists() {
            return Ok(());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
        if lines.len() <= self.max_lines as usize {
            return Ok(());
        }

        let keep = &lines[lines.len() - self.max_lines as usize..];
        let mut file = File::create(&self.path)?;
        for line in keep {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}

impl io::Write for CappedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf)?;

        let mut appended = self.appended.lock().unwrap_or_else(|e| e.into_inner());
        *appended += buf.iter().filter(|&&b| b == b'\n').count() as u32;

        // Trimming rereads the whole file, so batch it up
        let threshold = (self.max_lines / 10).max(50);
        if *appended >= threshold {
            if let Err(e) = self.trim() {
                eprintln!("Failed to trim log file: {}", e);
            }
            *appended = 0;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CappedFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let colored = "\x1b[32mINFO \x1b[0m message";
        assert_eq!(strip_ansi_escapes(colored), "INFO  message");
    }

    #[test]
    fn trims_file_to_max_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log").to_string_lossy().into_owned();
        let writer = CappedFileWriter::new(path.clone(), 10);

        {
            let mut w = writer.clone();
            for i in 0..200 {
                writeln!(w, "line {}", i).unwrap();
            }
        }
        writer.trim().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines.len() <= 10);
        assert_eq!(*lines.last().unwrap(), "line 199");
    }
}
