//! `/deals/top` response body encoding (§6.2): a self-describing header
//! of decimal lengths followed by the concatenated blobs.
//!
//! ```text
//! <L>;<s1>;<s2>;...;<sN>;<blob1><blob2>...<blobN>
//! ```
//!
//! `L` is the length, in bytes, of the header up to and including the
//! final `;` before the first blob — including `L`'s own digits. Because
//! writing `L` can itself grow the header (e.g. `9` -> `10` adds a
//! digit), encoding is a fixed-point computation: guess a width, compute
//! the header, check the length still matches the guess, and grow by one
//! digit if not.

/// Encodes a list of blobs into the `/deals/top` wire format.
pub fn encode_deals_top_body(blobs: &[&[u8]]) -> Vec<u8> {
    let sizes: Vec<usize> = blobs.iter().map(|b| b.len()).collect();
    let tail = render_tail(&sizes);

    // `L` must equal the byte length of `L;tail`. Start from the length
    // of `tail` alone and grow until the rendered `L` stops changing the
    // total length.
    let mut l = tail.len();
    loop {
        let candidate = format!("{l};{tail}");
        if candidate.len() == l {
            let mut out = Vec::with_capacity(candidate.len() + sizes.iter().sum::<usize>());
            out.extend_from_slice(candidate.as_bytes());
            for blob in blobs {
                out.extend_from_slice(blob);
            }
            return out;
        }
        l = candidate.len();
    }
}

fn render_tail(sizes: &[usize]) -> String {
    let mut tail = String::new();
    for size in sizes {
        tail.push_str(&size.to_string());
        tail.push(';');
    }
    tail
}
