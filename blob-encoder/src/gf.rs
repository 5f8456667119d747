//! Arithmetic in GF(2^8) with the 0x11d reduction polynomial.

const POLY: u16 = 0x11d;

struct Tables {
    exp: [u8; 512],
    log: [u8; 256],
}

const fn build_tables() -> Tables {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= POLY;
        }
        i += 1;
    }
    // doubled so mul never needs a modulo
    while i < 512 {
        exp[i] = exp[i - 255];
        i += 1;
    }
    Tables { exp, log }
}

static TABLES: Tables = build_tables();

pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    TABLES.exp[TABLES.log[a as usize] as usize + TABLES.log[b as usize] as usize]
}

/// Multiplicative inverse. Zero has none.
pub fn inv(a: u8) -> Option<u8> {
    if a == 0 {
        return None;
    }
    Some(TABLES.exp[255 - TABLES.log[a as usize] as usize])
}

/// Lookup row for multiplying many bytes by the same coefficient.
pub fn mul_table(c: u8) -> [u8; 256] {
    std::array::from_fn(|b| mul(c, b as u8))
}

/// Cauchy coefficient for parity row `row` and data column `col`.
///
/// Rows use x = row, columns use y = rows + col, so x ^ y is never zero
/// as long as rows + cols <= 256.
pub fn cauchy(row: usize, col: usize, rows: usize) -> Option<u8> {
    let x = row as u8;
    let y = (rows + col) as u8;
    inv(x ^ y)
}
