use log::warn;
use std::io::Write;

/// Outbound text link (verdicts, acknowledgements, diagnostic values).
///
/// Formatting follows the device firmware: integers in plain decimal, floats
/// as an integer part followed by `precision` truncated fractional digits.
/// Link errors are logged and counted, never propagated.
pub struct Reporter {
    out: Box<dyn Write + Send>,
    write_errors: u64,
}

impl Reporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            write_errors: 0,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn sink() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    fn emit(&mut self, bytes: &[u8]) {
        if let Err(e) = self.out.write_all(bytes) {
            self.write_errors += 1;
            warn!("report link write failed: {}", e);
        }
    }

    fn finish(&mut self, end: Option<&str>) {
        if let Some(end) = end {
            self.emit(end.as_bytes());
        }
        if let Err(e) = self.out.flush() {
            self.write_errors += 1;
            warn!("report link flush failed: {}", e);
        }
    }

    pub fn write_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.emit(c.encode_utf8(&mut buf).as_bytes());
        self.finish(None);
    }

    pub fn write_int(&mut self, n: i64, end: Option<&str>) {
        self.emit(n.to_string().as_bytes());
        self.finish(end);
    }

    pub fn write_float(&mut self, n: f32, end: Option<&str>, precision: usize) {
        self.emit(format_truncated(n, precision).as_bytes());
        self.finish(end);
    }

    pub fn write_word(&mut self, s: &str, end: Option<&str>) {
        self.emit(s.as_bytes());
        self.finish(end);
    }
}

/// Fixed-point rendering with truncated (not rounded) fractional digits.
pub fn format_truncated(n: f32, precision: usize) -> String {
    if !n.is_finite() {
        return n.to_string();
    }

    let mut out = String::new();
    let mut n = n as f64;
    if n < 0.0 {
        out.push('-');
        n = -n;
    }

    let whole = n.trunc();
    out.push_str(&(whole as i64).to_string());
    if precision == 0 {
        return out;
    }

    out.push('.');
    let mut frac = n - whole;
    for _ in 0..precision {
        frac *= 10.0;
        let digit = frac.trunc();
        out.push(char::from(b'0' + digit as u8));
        frac -= digit;
    }
    out
}


#[cfg(test)]
mod tests {
    use super::testing::SharedBuffer;
    use super::*;

    #[test]
    fn test_format_truncates() {
        assert_eq!(format_truncated(3.14159, 4), "3.1415");
        assert_eq!(format_truncated(-0.5, 2), "-0.50");
        assert_eq!(format_truncated(12.0, 0), "12");
        assert_eq!(format_truncated(0.0, 3), "0.000");
    }

    #[test]
    fn test_writes_with_terminators() {
        let buf = SharedBuffer::default();
        let mut r = Reporter::new(Box::new(buf.clone()));

        r.write_int(-42, Some(" "));
        r.write_float(1.25, Some("\n"), 2);
        r.write_word("Good", None);
        r.write_char('C');

        assert_eq!(buf.contents(), "-42 1.25\nGoodC");
        assert_eq!(r.write_errors(), 0);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_link_errors_are_counted() {
        let mut r = Reporter::new(Box::new(Broken));
        r.write_word("Bad", Some("\n"));
        assert_eq!(r.write_errors(), 2);
    }
}
