use std::collections::HashMap;

const VAR_START: &str = "${";
const VAR_END: &str = "}";

/// Substitute `${name}` references in `template`. Unknown names become empty.
pub fn format(template: &str, variables: &HashMap<String, String>) -> String {
	if !template.contains(VAR_START) {
		return template.to_string();
	}

	let mut out = String::with_capacity(template.len());
	let mut rest = template;
	while let Some(start) = rest.find(VAR_START) {
		let after_start = &rest[start + VAR_START.len()..];
		let Some(end) = after_start.find(VAR_END) else {
			break;
		};
		out.push_str(&rest[..start]);
		if let Some(value) = variables.get(&after_start[..end]) {
			out.push_str(value);
		}
		rest = &after_start[end + VAR_END.len()..];
	}
	out.push_str(rest);
	out
}
