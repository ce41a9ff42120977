//! xxd-style hexdump for log attachments.

use std::fmt::Write;

/// Render `buf` as an xxd-style dump, 16 bytes per line with an ASCII
/// gutter. Allocates; only call once a decision log line is definitely
/// going to be written.
pub fn hexdump(buf: &[u8]) -> String {
    let mut out = String::with_capacity(buf.len() * 4);
    for (i, chunk) in buf.chunks(16).enumerate() {
        let _ = write!(out, "{:04x}: ", i * 16);
        for j in 0..16 {
            match chunk.get(j) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                }
                None => out.push_str("   "),
            }
            if j == 7 {
                out.push(' ');
            }
        }
        out.push(' ');
        for b in chunk {
            out.push(if b.is_ascii_graphic() { *b as char } else { '.' });
        }
        out.push('\n');
    }
    out
}
