use nom::combinator::map;
use nom::{bytes, IResult, Parser};

/// Byte order of a fumen binary, autodetected on read.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Parse unsigned byte
pub fn parse_u8(i: &[u8]) -> IResult<&[u8], u8> {
    map(bytes::complete::take(1usize), |b: &[u8]| b[0]).parse(i)
}

/// Parse unsigned short
pub fn parse_u16(order: ByteOrder) -> impl FnMut(&[u8]) -> IResult<&[u8], u16> {
    move |i| {
        map(bytes::complete::take(2usize), |b: &[u8]| {
            let raw = [b[0], b[1]];
            match order {
                ByteOrder::Little => u16::from_le_bytes(raw),
                ByteOrder::Big => u16::from_be_bytes(raw),
            }
        })
        .parse(i)
    }
}

/// Parse unsigned 32
pub fn parse_u32(order: ByteOrder) -> impl FnMut(&[u8]) -> IResult<&[u8], u32> {
    move |i| {
        map(bytes::complete::take(4usize), |b: &[u8]| {
            let raw = [b[0], b[1], b[2], b[3]];
            match order {
                ByteOrder::Little => u32::from_le_bytes(raw),
                ByteOrder::Big => u32::from_be_bytes(raw),
            }
        })
        .parse(i)
    }
}

/// Parse signed 32
pub fn parse_i32(order: ByteOrder) -> impl FnMut(&[u8]) -> IResult<&[u8], i32> {
    move |i| map(parse_u32(order), |v| v as i32).parse(i)
}

/// Parse 32-bit float
pub fn parse_f32(order: ByteOrder) -> impl FnMut(&[u8]) -> IResult<&[u8], f32> {
    move |i| map(parse_u32(order), f32::from_bits).parse(i)
}

/// Parse a fixed number of raw bytes into an array
pub fn parse_bytes<const N: usize>(i: &[u8]) -> IResult<&[u8], [u8; N]> {
    map(bytes::complete::take(N), |b: &[u8]| {
        let mut raw = [0u8; N];
        raw.copy_from_slice(b);
        raw
    })
    .parse(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u16_both_orders() {
        let data = [0x01, 0x02];
        let (_, le) = parse_u16(ByteOrder::Little)(&data).unwrap();
        let (_, be) = parse_u16(ByteOrder::Big)(&data).unwrap();
        assert_eq!(le, 0x0201);
        assert_eq!(be, 0x0102);
    }

    #[test]
    fn test_parse_f32_little() {
        let data = 120.0f32.to_le_bytes();
        let (_, v) = parse_f32(ByteOrder::Little)(&data).unwrap();
        assert_eq!(v, 120.0);
    }

    #[test]
    fn test_parse_truncated_input() {
        let data = [0x01];
        assert!(parse_u32(ByteOrder::Little)(&data).is_err());
    }
}
