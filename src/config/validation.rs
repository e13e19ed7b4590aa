use std::collections::HashSet;

use super::schema::Config;

/// Validate the attribute list at startup.
/// Returns all validation errors at once (not just the first).
///
/// Unknown attribute names are not errors here: they fail resolution later
/// and are skipped while scoring.
pub fn validate_config(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, attribute) in config.attributes.iter().enumerate() {
        let name = attribute.name.trim();

        if name.is_empty() {
            errors.push(format!("attributes[{}].name: must not be empty", i));
        } else if !seen.insert(name) {
            errors.push(format!(
                "attributes[{}].name: duplicate attribute '{}'",
                i, attribute.name
            ));
        }

        if attribute.enabled && !attribute.weight.is_finite() {
            errors.push(format!(
                "attributes[{}].weight: must be a finite number, got {}",
                i, attribute.weight
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
