//! Natural version ordering.

use std::cmp::Ordering;

// The comparison is a port of the GNU `strverscmp` state machine: digit runs
// compare numerically, but a run with leading zeros compares as a decimal
// fraction, so `1.001 < 1.01 < 1.1`.
//
// States track what kind of run the strings are in while their bytes are
// still equal: S_N outside a digit run, S_I inside an integral run, S_F/S_Z
// inside a fractional run (one that started with `0`).

const S_N: u8 = 0x0;
const S_I: u8 = 0x3;
const S_F: u8 = 0x6;
const S_Z: u8 = 0x9;

const CMP: i8 = 2;
const LEN: i8 = 3;

#[rustfmt::skip]
const NEXT_STATE: [u8; 12] = [
    /* state  other  digit  zero */
    /* S_N */ S_N,   S_I,   S_Z,
    /* S_I */ S_N,   S_I,   S_I,
    /* S_F */ S_N,   S_F,   S_F,
    /* S_Z */ S_N,   S_F,   S_Z,
];

#[rustfmt::skip]
const RESULT_TYPE: [i8; 36] = [
    /* state  x/x  x/d  x/0  d/x  d/d  d/0  0/x  0/d  0/0 */
    /* S_N */ CMP, CMP, CMP, CMP, LEN, CMP, CMP, CMP, CMP,
    /* S_I */ CMP, -1,  -1,   1,  LEN, LEN,  1,  LEN, LEN,
    /* S_F */ CMP, CMP, CMP, CMP, CMP, CMP, CMP, CMP, CMP,
    /* S_Z */ CMP,  1,   1,  -1,  CMP, CMP, -1,  CMP, CMP,
];

/// Character class: 0 for a non-digit, 1 for `1`-`9`, 2 for `0`.
fn class(c: u8) -> u8 {
    (c == b'0') as u8 + c.is_ascii_digit() as u8
}

/// Byte at `i`, with the string treated as NUL terminated.
fn at(s: &[u8], i: usize) -> u8 {
    s.get(i).copied().unwrap_or(0)
}

/// Compares two version strings in natural version order.
///
/// Runs of digits are compared numerically, except that runs starting with a
/// zero are compared as decimal fractions:
///
/// ```
/// use std::cmp::Ordering;
/// use unit_conditions::version_cmp;
///
/// assert_eq!(version_cmp("5.15.0-42-generic", "5.10"), Ordering::Greater);
/// assert_eq!(version_cmp("1.001", "1.01"), Ordering::Less);
/// assert_eq!(version_cmp("1.01", "1.1"), Ordering::Less);
/// ```
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    let p1 = a.as_bytes();
    let p2 = b.as_bytes();
    let mut i1 = 0usize;
    let mut i2 = 0usize;

    let mut c1 = at(p1, i1);
    let mut c2 = at(p2, i2);
    i1 += 1;
    i2 += 1;
    let mut state = S_N + class(c1);

    loop {
        let diff = i32::from(c1) - i32::from(c2);
        if diff != 0 {
            return match RESULT_TYPE[state as usize * 3 + class(c2) as usize] {
                CMP => diff.cmp(&0),
                LEN => {
                    // Equal digit prefixes; the longer run of digits is the
                    // larger number.
                    loop {
                        let d1 = at(p1, i1);
                        i1 += 1;
                        if !d1.is_ascii_digit() {
                            break;
                        }
                        let d2 = at(p2, i2);
                        i2 += 1;
                        if !d2.is_ascii_digit() {
                            return Ordering::Greater;
                        }
                    }
                    if at(p2, i2).is_ascii_digit() {
                        Ordering::Less
                    } else {
                        diff.cmp(&0)
                    }
                }
                r if r < 0 => Ordering::Less,
                _ => Ordering::Greater,
            };
        }
        if c1 == 0 {
            return Ordering::Equal;
        }
        state = NEXT_STATE[state as usize];
        c1 = at(p1, i1);
        c2 = at(p2, i2);
        i1 += 1;
        i2 += 1;
        state += class(c1);
    }
}
