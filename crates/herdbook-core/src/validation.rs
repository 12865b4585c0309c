// crates/herdbook-core/src/validation.rs

use crate::types::SensorKind;

/// Outcome of checking a reading's value against its sensor kind. Invalid
/// readings are still stored; reports skip them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueAssessment {
    pub is_valid: bool,
    pub validation_error: Option<String>,
}

impl ValueAssessment {
    fn valid() -> Self {
        Self {
            is_valid: true,
            validation_error: None,
        }
    }

    fn invalid(message: String) -> Self {
        Self {
            is_valid: false,
            validation_error: Some(message),
        }
    }
}

pub fn assess_value(kind: &SensorKind, value: Option<f64>) -> ValueAssessment {
    let Some(value) = value else {
        return ValueAssessment::invalid("value is null".to_string());
    };

    if !value.is_finite() {
        return ValueAssessment::invalid(format!("value is {value}"));
    }

    // Weights and milk volumes can't be zero or negative.
    if kind.requires_positive() && value <= 0.0 {
        return ValueAssessment::invalid(format!("value is {value:?}"));
    }

    ValueAssessment::valid()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_values_are_invalid_for_every_kind() {
        let assessment = assess_value(&SensorKind::Temperature, None);
        assert!(!assessment.is_valid);
        assert_eq!(assessment.validation_error.as_deref(), Some("value is null"));
    }

    #[test]
    fn non_positive_weight_and_milk_are_invalid() {
        let zero_weight = assess_value(&SensorKind::Weight, Some(0.0));
        assert!(!zero_weight.is_valid);
        assert_eq!(zero_weight.validation_error.as_deref(), Some("value is 0.0"));

        let negative_milk = assess_value(&SensorKind::MilkYield, Some(-2.5));
        assert_eq!(negative_milk.validation_error.as_deref(), Some("value is -2.5"));
    }

    #[test]
    fn negative_temperature_is_fine() {
        assert!(assess_value(&SensorKind::Temperature, Some(-4.0)).is_valid);
        assert!(assess_value(&SensorKind::Weight, Some(512.3)).is_valid);
    }

    #[test]
    fn non_finite_values_are_invalid() {
        let assessment = assess_value(&SensorKind::Weight, Some(f64::INFINITY));
        assert_eq!(assessment.validation_error.as_deref(), Some("value is inf"));
    }
}
