use unicode_segmentation::UnicodeSegmentation;

/// Parses a pattern string, processing escape sequences \\, \xXX, \0, \n, \t and \r into
/// their byte values. Everything else is copied through as its UTF-8 bytes, so patterns mix
/// readable text with arbitrary byte values.
///
/// Ignores any errors or unexpected values/conditions that occur, e.g. invalid escape
/// sequences such as \i will be ignored
pub fn parse_pattern_str(string: &str) -> Vec<u8> {
	let mut buf: Vec<u8> = Vec::new();

	let gcs: Vec<&str> = string.graphemes(true).collect();

	let mut escaped = false;

	let mut i = 0;
	while i < gcs.len() {
		if escaped {
			escaped = false;
			match gcs[i] {
				"\\" => {
					buf.push(b'\\');
				}
				"n" => {
					buf.push(b'\n');
				}
				"t" => {
					buf.push(b'\t');
				}
				"r" => {
					buf.push(b'\r');
				}
				"0" => {
					buf.push(b'\0');
				}
				"x" => {
					if (i + 2) < gcs.len() {
						let hex_str = &gcs[(i + 1)..=(i + 2)].join("");
						if let Ok(val) = u8::from_str_radix(hex_str, 16) {
							buf.push(val);
						}
					}

					i += 3;
					continue;
				}
				_ => ()
			}
		} else {
			match gcs[i] {
				"\\" => {
					escaped = true;
				}
				c => {
					buf.extend_from_slice(c.as_bytes());
				}
			}
		}

		i += 1;
	}

	buf
}

#[cfg(test)]
mod test {
	use super::parse_pattern_str;

	#[test]
	fn test_parse_pattern_str() {
		let test_str = "\\x7f\\0\\r\\t\\s\\n\\xy1\\x9aPK.🤩";

		let expected: &'static [u8] = &[
			0x7f, 0x00, b'\r', b'\t', b'\n', 0x9a, b'P', b'K', b'.', 0xf0, 0x9f, 0xa4, 0xa9
		];

		let computed = parse_pattern_str(test_str);

		assert_eq!(expected, computed);
	}

	#[test]
	fn test_parse_plain_text() {
		assert_eq!(parse_pattern_str("Hello"), b"Hello");
	}

	#[test]
	fn test_parse_escaped_backslash() {
		assert_eq!(parse_pattern_str("a\\\\b"), b"a\\b");
	}
}
