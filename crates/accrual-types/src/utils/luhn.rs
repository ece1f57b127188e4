//! Luhn checksum validation for order numbers.

/// Checks an order number against the Luhn algorithm.
///
/// Spaces are ignored. Numbers shorter than two digits or containing
/// anything other than ASCII digits are rejected.
pub fn is_valid_luhn(number: &str) -> bool {
	let digits: Vec<u32> = match number
		.chars()
		.filter(|c| *c != ' ')
		.map(|c| c.to_digit(10))
		.collect::<Option<Vec<_>>>()
	{
		Some(digits) => digits,
		None => return false,
	};

	if digits.len() < 2 {
		return false;
	}

	let sum: u32 = digits
		.iter()
		.rev()
		.enumerate()
		.map(|(i, &d)| {
			if i % 2 == 1 {
				let doubled = d * 2;
				if doubled > 9 {
					doubled - 9
				} else {
					doubled
				}
			} else {
				d
			}
		})
		.sum();

	sum % 10 == 0
}
