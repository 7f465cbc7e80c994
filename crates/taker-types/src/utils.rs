//! Display formatting helpers.

/// Truncates a long id for log output: first 10 characters followed by `..`.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 10 {
		id.to_string()
	} else {
		format!("{}..", &id[..10])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("0x1234"), "0x1234");
		assert_eq!(
			truncate_id("0x0123456789abcdef0123456789abcdef"),
			"0x01234567.."
		);
	}
}
