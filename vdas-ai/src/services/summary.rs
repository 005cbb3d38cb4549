//! Human-readable assessment summary

use crate::models::Detection;

/// Title-cased class name, `"Damage"` when the class is empty
pub fn class_label(detection: &Detection) -> String {
    let class = title_case(&separators_to_spaces(&detection.class_name));
    if class.is_empty() {
        "Damage".to_string()
    } else {
        class
    }
}

/// Display label of a detection, e.g. `"Front Bumper Dent (moderate severity)"`
pub fn prediction_label(detection: &Detection) -> String {
    let class = class_label(detection);

    match detection.severity.as_deref().map(separators_to_spaces) {
        Some(severity) if !severity.is_empty() => {
            format!("{} ({} severity)", class, severity.to_lowercase())
        }
        _ => class,
    }
}

/// Summary text over all sides' new damages
pub fn build_summary(new_damages: &[Detection]) -> String {
    match new_damages {
        [] => "The car is in good condition.".to_string(),
        [only] => format!("The car has one damage: {}", prediction_label(only)),
        many => {
            let mut summary = format!("The car has {} damages:", many.len());
            for (index, detection) in many.iter().enumerate() {
                summary.push_str(&format!("\n{}. {}", index + 1, prediction_label(detection)));
            }
            summary
        }
    }
}

fn separators_to_spaces(value: &str) -> String {
    value
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(value: &str) -> String {
    value
        .split(' ')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
