use nom::{
    combinator::map,
    number::complete::{be_u16, be_u32},
    IResult,
};

pub struct Utils;

impl Utils {
    // fixed-point register helpers, used from #[nom(Parse = "...")] attributes

    pub fn be_u16_div10(input: &[u8]) -> IResult<&[u8], f64> {
        map(be_u16, |v| f64::from(v) / 10.0)(input)
    }

    pub fn be_u16_div100(input: &[u8]) -> IResult<&[u8], f64> {
        map(be_u16, |v| f64::from(v) / 100.0)(input)
    }

    pub fn be_u32_div10(input: &[u8]) -> IResult<&[u8], f64> {
        map(be_u32, |v| f64::from(v) / 10.0)(input)
    }

    /// Text field at a fixed offset, padded on the right with spaces.
    pub fn ascii_field(input: &[u8], start: usize, end: usize) -> Option<String> {
        let bytes = input.get(start..end)?;
        if !bytes.is_ascii() {
            return None;
        }

        Some(String::from_utf8_lossy(bytes).trim_end().to_string())
    }

    pub fn hex(input: &[u8]) -> String {
        input.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_values() {
        assert_eq!(Utils::be_u16_div10(&[0x09, 0x4d]).unwrap().1, 238.1);
        assert_eq!(Utils::be_u16_div100(&[0x13, 0x8c]).unwrap().1, 50.04);
        assert_eq!(
            Utils::be_u32_div10(&[0x00, 0x00, 0x7a, 0x90]).unwrap().1,
            3137.6
        );
    }

    #[test]
    fn short_input_is_an_error() {
        assert!(Utils::be_u16_div10(&[0x09]).is_err());
    }

    #[test]
    fn ascii_field_trims_padding() {
        assert_eq!(
            Utils::ascii_field(b"  GW1500-XS  ", 2, 13),
            Some("GW1500-XS".to_string())
        );
        assert_eq!(Utils::ascii_field(b"abc", 1, 10), None);
        assert_eq!(Utils::ascii_field(&[0x41, 0xff], 0, 2), None);
    }

    #[test]
    fn hex_string() {
        assert_eq!(Utils::hex(&[0xaa, 0x55, 0x01]), "aa5501");
    }
}
