//! 十六进制格式化：大写两位、单空格分隔

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// 把字节追加为 `01 02 0A` 形式
pub fn write_hex(out: &mut Vec<u8>, bytes: &[u8]) {
    out.reserve(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        out.push(HEX_DIGITS[(b >> 4) as usize]);
        out.push(HEX_DIGITS[(b & 0x0F) as usize]);
    }
}

/// 格式化为字符串
///
/// ```
/// assert_eq!(cyclic_logger::format_hex(&[0x01, 0xAB, 0x0A]), "01 AB 0A");
/// ```
pub fn format_hex(bytes: &[u8]) -> String {
    let mut out = Vec::with_capacity(bytes.len() * 3);
    write_hex(&mut out, bytes);
    // 只包含 ASCII
    String::from_utf8_lossy(&out).into_owned()
}
