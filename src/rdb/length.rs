//! RDB length encodings. The top two bits of the first byte select the mode:
//! `00` keeps the lower six bits, `01` combines them big-endian with the next
//! byte into a 14-bit length, `10` takes the next four bytes as a 32-bit
//! big-endian length, and `11` marks the special string encodings this loader
//! does not support.

pub fn take<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> tokio::io::Result<&'a [u8]> {
    if *cursor + len > bytes.len() {
        return Err(tokio::io::Error::new(
            tokio::io::ErrorKind::UnexpectedEof,
            "not enough data in RDB buffer",
        ));
    }

    let slice = &bytes[*cursor..*cursor + len];
    *cursor += len;

    Ok(slice)
}

pub fn read_byte(bytes: &[u8], cursor: &mut usize) -> tokio::io::Result<u8> {
    Ok(take(bytes, cursor, 1)?[0])
}

pub fn read_length(bytes: &[u8], cursor: &mut usize) -> tokio::io::Result<usize> {
    let first = read_byte(bytes, cursor)?;

    match first >> 6 {
        0b00 => Ok((first & 0b0011_1111) as usize),
        0b01 => {
            let second = read_byte(bytes, cursor)?;
            Ok((((first & 0b0011_1111) as usize) << 8) | second as usize)
        }
        0b10 => {
            let slice = take(bytes, cursor, 4)?;
            let four: [u8; 4] = slice.try_into().map_err(|_| {
                tokio::io::Error::new(
                    tokio::io::ErrorKind::UnexpectedEof,
                    "not enough bytes for a 32-bit length",
                )
            })?;
            Ok(u32::from_be_bytes(four) as usize)
        }
        _ => Err(tokio::io::Error::new(
            tokio::io::ErrorKind::Unsupported,
            "special length encodings are not supported",
        )),
    }
}

pub fn read_string(bytes: &[u8], cursor: &mut usize) -> tokio::io::Result<String> {
    let length = read_length(bytes, cursor)?;
    let slice = take(bytes, cursor, length)?;

    String::from_utf8(slice.to_vec()).map_err(|_| {
        tokio::io::Error::new(
            tokio::io::ErrorKind::InvalidData,
            "RDB string is not valid UTF-8",
        )
    })
}
