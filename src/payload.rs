//! DATA packets carry a slice of a fixed pseudo-random reference sequence as payload. Every
//!  payload starts at offset 0 of the sequence and cycles through it, so a receiver can detect
//!  corruption by content alone, independent of sequence numbers.

use bytes::BufMut;

pub const REFERENCE_LEN: usize = 720;

pub static REFERENCE_SEQUENCE: [u8; REFERENCE_LEN] = [
    0xCF, 0x26, 0xBD, 0xE0, 0x39, 0x7E, 0xCA, 0xD5, 0xEF, 0xA8, 0x26, 0x3C, 0x5F, 0x04, 0x18, 0x8D,
    0x07, 0xB0, 0x93, 0x7D, 0xED, 0xA3, 0x46, 0x89, 0x4E, 0x0F, 0xA1, 0xC2, 0x29, 0x36, 0x15, 0x91,
    0xB7, 0x35, 0x09, 0x89, 0x7F, 0x96, 0xE9, 0x2D, 0x30, 0x70, 0x48, 0xD5, 0x8A, 0x84, 0x7D, 0x70,
    0x8B, 0xB7, 0x2D, 0xCA, 0xB6, 0x7A, 0xF5, 0xE0, 0x23, 0x9A, 0x47, 0x01, 0x47, 0x50, 0x1B, 0xB4,
    0xE2, 0xE1, 0x49, 0x1D, 0x67, 0xAB, 0x70, 0xE0, 0x86, 0x86, 0x36, 0xF5, 0x10, 0xA5, 0x64, 0x73,
    0xA9, 0xB7, 0xE6, 0x15, 0x61, 0x5B, 0xE4, 0xCD, 0xA4, 0xE2, 0xE5, 0x5D, 0x6E, 0x68, 0x49, 0xBE,
    0x64, 0x02, 0x70, 0x06, 0x17, 0x98, 0x74, 0x68, 0x33, 0x66, 0x51, 0x36, 0x49, 0x0B, 0x49, 0x2C,
    0xED, 0x5B, 0x01, 0xC0, 0x72, 0xE0, 0x96, 0x73, 0x35, 0xE4, 0x6D, 0x0E, 0xB8, 0xBA, 0xAC, 0xD6,
    0x50, 0x84, 0xE9, 0x48, 0x7E, 0x22, 0x4C, 0x3B, 0x39, 0x3C, 0x96, 0xD4, 0xBE, 0xF6, 0x06, 0x55,
    0xA2, 0x3F, 0x34, 0x9B, 0x97, 0x94, 0xBE, 0x32, 0xBE, 0x54, 0x69, 0x16, 0xA0, 0x75, 0xE4, 0x37,
    0xE4, 0x4E, 0xBC, 0x38, 0x89, 0xAE, 0xBF, 0x5F, 0x1F, 0x12, 0xA1, 0x1F, 0xA9, 0x5F, 0x8B, 0x52,
    0xC9, 0x94, 0x2F, 0xBC, 0x02, 0xAE, 0x7A, 0xA7, 0x98, 0x34, 0x44, 0xD1, 0x9E, 0x58, 0xD1, 0x32,
    0xD3, 0x4A, 0xE9, 0x13, 0x10, 0xCB, 0xDE, 0xF4, 0x00, 0x1B, 0xDB, 0x35, 0x12, 0xEC, 0x70, 0xF2,
    0x2E, 0xA6, 0xE8, 0xCE, 0xDB, 0x4B, 0x04, 0xAC, 0xD4, 0xE6, 0xE1, 0x46, 0x0D, 0x9F, 0x63, 0xAB,
    0xC3, 0x9C, 0x74, 0x80, 0x19, 0x5D, 0xCD, 0xF3, 0x8D, 0xCC, 0x7C, 0x2C, 0x28, 0x4C, 0xCD, 0xBA,
    0xC3, 0x19, 0xA3, 0x59, 0x47, 0x6B, 0x54, 0x0C, 0x5F, 0x26, 0x5A, 0x19, 0x41, 0xFA, 0x77, 0x5F,
    0xD0, 0x85, 0x48, 0x92, 0x68, 0x23, 0x53, 0xAF, 0x79, 0x79, 0x91, 0x88, 0xF4, 0x71, 0xB0, 0xBA,
    0xB8, 0x6C, 0x2A, 0x8C, 0x2E, 0xB4, 0x6F, 0x24, 0x83, 0x65, 0x4B, 0x58, 0x56, 0x65, 0x9E, 0x7B,
    0xB2, 0x1E, 0xE8, 0x9E, 0xA2, 0x57, 0x1F, 0xF3, 0x4B, 0x25, 0x98, 0xDD, 0xD5, 0xB2, 0x6E, 0x6E,
    0xBE, 0xBF, 0xF2, 0xEA, 0x67, 0xBA, 0x25, 0x05, 0x84, 0x30, 0x9E, 0x9A, 0xC5, 0x66, 0x0B, 0x21,
    0x43, 0xEB, 0x1E, 0x50, 0xC6, 0xA8, 0x8C, 0xAB, 0x65, 0x76, 0x54, 0x76, 0xB6, 0xF7, 0x4C, 0x0F,
    0xCC, 0x83, 0xAA, 0x93, 0xF1, 0x3E, 0x82, 0x37, 0xED, 0x9D, 0xFD, 0x19, 0xB9, 0x34, 0x2E, 0x93,
    0x67, 0x6A, 0x6E, 0x90, 0x68, 0xE6, 0x2F, 0x57, 0x1C, 0x5A, 0x30, 0xF4, 0xCB, 0xC2, 0x58, 0x51,
    0x28, 0xD3, 0x8F, 0xF7, 0x53, 0x90, 0x4B, 0xED, 0x4D, 0x9C, 0x9B, 0x6D, 0x8D, 0x6E, 0x6B, 0x3E,
    0x65, 0xD0, 0x9A, 0xC2, 0x99, 0x9F, 0x6C, 0x1E, 0xA7, 0xE4, 0xA8, 0x91, 0xAB, 0xC0, 0xEE, 0x52,
    0x86, 0x32, 0xAC, 0x4B, 0x33, 0x79, 0x56, 0x0C, 0x9E, 0x03, 0xDB, 0x8C, 0xD5, 0x00, 0xE4, 0xBC,
    0xD2, 0x9A, 0x7D, 0xF7, 0x8D, 0x98, 0xD5, 0xDE, 0xB5, 0xDE, 0xC6, 0x94, 0xEB, 0xBB, 0x9E, 0x7E,
    0xC9, 0xE2, 0xB5, 0x3E, 0x11, 0x7A, 0x5A, 0xDC, 0xE9, 0x63, 0x9D, 0x09, 0x29, 0x4F, 0xF5, 0x92,
    0xFC, 0x8C, 0x35, 0x9B, 0x3C, 0xC2, 0x35, 0x62, 0xE5, 0x08, 0x3B, 0x68, 0x08, 0x95, 0x45, 0xD5,
    0x23, 0x4E, 0xD0, 0x8F, 0x2E, 0xBF, 0xEF, 0x80, 0xB4, 0x96, 0xBC, 0xF5, 0xA0, 0x06, 0xCA, 0xCA,
    0x57, 0x07, 0xA2, 0x09, 0x7D, 0x22, 0xF1, 0xE8, 0x02, 0x18, 0xA7, 0x4A, 0x51, 0x50, 0xD5, 0xF0,
    0x2E, 0xAC, 0x4D, 0x84, 0xB2, 0x1D, 0xD9, 0x63, 0x9F, 0x61, 0xA1, 0x01, 0xE8, 0x5A, 0xBD, 0x32,
    0x83, 0x8B, 0x46, 0xE1, 0x8B, 0x07, 0xC6, 0xF3, 0x1F, 0xFC, 0xC0, 0x32, 0x4D, 0x64, 0xEC, 0x6E,
    0xA2, 0x46, 0x03, 0x1A, 0xC9, 0x44, 0x00, 0xE2, 0x89, 0x50, 0x64, 0x93, 0x6A, 0xC0, 0x98, 0xDE,
    0x41, 0x92, 0x4D, 0x1A, 0xF5, 0x5C, 0x9D, 0xF3, 0x16, 0xE2, 0x78, 0xD2, 0x56, 0xBE, 0xA5, 0x9B,
    0x51, 0xBF, 0x8C, 0xDD, 0x9B, 0xCC, 0x5B, 0xF3, 0x09, 0xFC, 0x61, 0xDE, 0xC6, 0xBE, 0xE3, 0x2C,
    0xDB, 0x97, 0x8A, 0x46, 0x98, 0xB3, 0x1D, 0xE0, 0x2B, 0xB1, 0x3C, 0x65, 0x2D, 0x5B, 0x6F, 0x9A,
    0xE4, 0xF5, 0x55, 0x21, 0xA3, 0x5C, 0xEC, 0x66, 0x71, 0x61, 0x7D, 0xA4, 0xDE, 0x4C, 0x5D, 0xEC,
    0xFB, 0x4E, 0x21, 0x7E, 0xF9, 0xC5, 0xB6, 0xD2, 0x4D, 0x61, 0xD2, 0xB2, 0xC3, 0xA5, 0x6D, 0x82,
    0x3B, 0x8A, 0xBD, 0x15, 0x41, 0x2F, 0xA5, 0x5B, 0x5B, 0x41, 0x0A, 0x45, 0x9B, 0x9E, 0x85, 0x98,
    0xCE, 0x9C, 0xC1, 0xCF, 0xDB, 0x22, 0xAC, 0x5A, 0xA5, 0x6E, 0xAA, 0x40, 0xB8, 0x42, 0x4A, 0x93,
    0x49, 0x5F, 0x39, 0x56, 0x5C, 0xA0, 0xF6, 0xE9, 0xE2, 0xC0, 0x6F, 0x3A, 0x1D, 0x49, 0xDF, 0xDC,
    0xC9, 0xBC, 0x46, 0x9C, 0xD3, 0x3C, 0x18, 0x69, 0xAE, 0x2B, 0x88, 0x2B, 0x80, 0xC5, 0x4A, 0x26,
    0x2A, 0xC1, 0x73, 0x8C, 0xFD, 0x0C, 0x47, 0x25, 0xB0, 0xF9, 0x9D, 0x9A, 0x02, 0x49, 0x04, 0xE3,
    0x1A, 0x50, 0x77, 0x5C, 0x15, 0xC2, 0x91, 0x05, 0x87, 0x60, 0xAB, 0x3D, 0x59, 0xB5, 0x30, 0x6C,
];

/// fills the entire buffer with the reference sequence
pub fn fill(buf: &mut [u8]) {
    for (b, r) in buf.iter_mut().zip(REFERENCE_SEQUENCE.iter().cycle()) {
        *b = *r;
    }
}

/// appends `len` bytes of the reference sequence
pub fn put(buf: &mut impl BufMut, len: usize) {
    let mut remaining = len;
    while remaining > 0 {
        let chunk = remaining.min(REFERENCE_LEN);
        buf.put_slice(&REFERENCE_SEQUENCE[..chunk]);
        remaining -= chunk;
    }
}

#[must_use]
pub fn validate(buf: &[u8]) -> bool {
    buf.chunks(REFERENCE_LEN)
        .all(|chunk| chunk == &REFERENCE_SEQUENCE[..chunk.len()])
}
