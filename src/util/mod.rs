//! Utility module
//!
//! Integer printing into a transport, for diagnostic output on the bus.

use crate::core::Result;
use crate::transport::Port;

/// Widest rendering: 64 binary digits plus a sign
pub const NUMBER_BUFFER_LEN: usize = 65;

const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Maps a requested base onto 2..=36; anything below 2 means decimal
pub fn normalize_base(base: u32) -> u32 {
    if base < 2 {
        10
    } else {
        base.min(36)
    }
}

/// Renders `magnitude` in `base` into the tail of `buffer`, returning the digits
pub fn format_radix(
    magnitude: u64,
    negative: bool,
    base: u32,
    buffer: &mut [u8; NUMBER_BUFFER_LEN],
) -> &[u8] {
    let base = normalize_base(base) as u64;
    let mut n = magnitude;
    let mut start = buffer.len();
    loop {
        start -= 1;
        buffer[start] = DIGITS[(n % base) as usize];
        n /= base;
        if n == 0 {
            break;
        }
    }
    if negative {
        start -= 1;
        buffer[start] = b'-';
    }
    &buffer[start..]
}

/// Text output on top of any [`Port`]
pub trait Print: Port {
    fn print_str(&mut self, text: &str) -> Result<usize> {
        self.write(text.as_bytes())
    }

    fn print_unsigned(&mut self, n: u64, base: u32) -> Result<usize> {
        let mut buffer = [0u8; NUMBER_BUFFER_LEN];
        let digits = format_radix(n, false, base, &mut buffer);
        self.write(digits)
    }

    fn print_signed(&mut self, n: i64, base: u32) -> Result<usize> {
        let mut buffer = [0u8; NUMBER_BUFFER_LEN];
        let digits = format_radix(n.unsigned_abs(), n < 0, base, &mut buffer);
        self.write(digits)
    }
}

impl<P: Port + ?Sized> Print for P {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryPort;
    use rand::Rng;

    fn render_signed(n: i64, base: u32) -> String {
        let mut port = MemoryPort::new(9600);
        let written = port.print_signed(n, base).unwrap();
        let text = String::from_utf8(port.take_tx()).unwrap();
        assert_eq!(written, text.len());
        text
    }

    fn render_unsigned(n: u64, base: u32) -> String {
        let mut port = MemoryPort::new(9600);
        let written = port.print_unsigned(n, base).unwrap();
        let text = String::from_utf8(port.take_tx()).unwrap();
        assert_eq!(written, text.len());
        text
    }

    #[test]
    fn test_known_values() {
        assert_eq!(render_unsigned(0, 10), "0");
        assert_eq!(render_unsigned(255, 16), "FF");
        assert_eq!(render_unsigned(5, 2), "101");
        assert_eq!(render_unsigned(35, 36), "Z");
        assert_eq!(render_signed(-42, 10), "-42");
        assert_eq!(render_signed(-255, 16), "-FF");
        assert_eq!(render_unsigned(u64::MAX, 2), "1".repeat(64));
        assert_eq!(render_signed(i64::MIN, 2), format!("-1{}", "0".repeat(63)));
    }

    #[test]
    fn test_degenerate_base_is_decimal() {
        assert_eq!(render_unsigned(1234, 0), "1234");
        assert_eq!(render_unsigned(1234, 1), "1234");
        assert_eq!(render_signed(-7, 1), "-7");
        assert_eq!(normalize_base(99), 36);
    }

    #[test]
    fn test_round_trip_all_bases() {
        let mut rng = rand::thread_rng();
        let mut signed: Vec<i64> = vec![0, 1, -1, i64::MIN, i64::MAX];
        signed.extend((0..50).map(|_| rng.gen::<i64>()));
        let mut unsigned: Vec<u64> = vec![0, 1, u64::MAX];
        unsigned.extend((0..50).map(|_| rng.gen::<u64>()));

        for base in 2..=36 {
            for &n in &signed {
                let text = render_signed(n, base);
                assert_eq!(i64::from_str_radix(&text, base).unwrap(), n);
                assert_eq!(text.matches('-').count(), usize::from(n < 0));
            }
            for &n in &unsigned {
                let text = render_unsigned(n, base);
                assert_eq!(u64::from_str_radix(&text, base).unwrap(), n);
            }
        }
    }

    #[test]
    fn test_print_through_dyn_port() {
        let mut port = MemoryPort::new(9600);
        {
            let dyn_port: &mut dyn Port = &mut port;
            assert_eq!(dyn_port.print_str("t=").unwrap(), 2);
            assert_eq!(dyn_port.print_signed(-5, 10).unwrap(), 2);
        }
        assert_eq!(port.tx(), b"t=-5");
    }
}
