//! Value-domain validation
//!
//! The repository's own rules for what a value set may contain. The validity
//! checker delegates scalar compatibility to [`ParameterType::validate`].

use crate::error::ValidationError;
use crate::parameter_type::{ParameterType, ParameterTypeKind};
use crate::scale::MeasurementScale;
use crate::PLACEHOLDER_VALUE;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const TRUE_LITERALS: [&str; 3] = ["true", "1", "yes"];
const FALSE_LITERALS: [&str; 3] = ["false", "0", "no"];

impl ParameterType {
    /// Validate one value against this type
    ///
    /// For structured types the value is checked against the cell / first
    /// component domain; use [`validate_values`](Self::validate_values) for a
    /// whole value array.
    ///
    /// `scale` overrides the type's default scale for quantity kinds.
    ///
    /// # Errors
    /// Returns the first domain violation found
    pub fn validate(&self, value: &str, scale: Option<&MeasurementScale>) -> Result<(), ValidationError> {
        if self.is_deprecated {
            return Err(ValidationError::Deprecated(self.name.clone()));
        }
        let scale = scale.or_else(|| self.default_scale());
        validate_kind(&self.kind, value, scale)
    }

    /// Validate a full value array
    ///
    /// Arrays must hold exactly `value_arity()` values; sampled functions a
    /// whole number of samples. Each value is checked against its component.
    ///
    /// # Errors
    /// Returns arity or domain violations
    pub fn validate_values(
        &self,
        values: &[String],
        scale: Option<&MeasurementScale>,
    ) -> Result<(), ValidationError> {
        if self.is_deprecated {
            return Err(ValidationError::Deprecated(self.name.clone()));
        }

        match &self.kind {
            ParameterTypeKind::Array { component, .. } => {
                let expected = self.value_arity();
                if values.len() != expected {
                    return Err(ValidationError::ArityMismatch {
                        expected,
                        actual: values.len(),
                    });
                }
                values
                    .iter()
                    .try_for_each(|v| validate_kind(component, v, scale))
            }
            ParameterTypeKind::SampledFunction { .. } => {
                let components = self.sampled_components();
                let arity = components.len();
                if arity == 0 || values.len() % arity != 0 {
                    return Err(ValidationError::ArityMismatch {
                        expected: arity,
                        actual: values.len(),
                    });
                }
                values.iter().enumerate().try_for_each(|(i, v)| {
                    let component = components[i % arity];
                    validate_kind(&component.kind, v, component.scale.as_ref())
                })
            }
            _ => {
                if values.len() != 1 {
                    return Err(ValidationError::ArityMismatch {
                        expected: 1,
                        actual: values.len(),
                    });
                }
                self.validate(&values[0], scale)
            }
        }
    }
}

fn validate_kind(
    kind: &ParameterTypeKind,
    value: &str,
    scale: Option<&MeasurementScale>,
) -> Result<(), ValidationError> {
    let value = value.trim();
    if value == PLACEHOLDER_VALUE {
        return Ok(());
    }

    match kind {
        ParameterTypeKind::Quantity { .. } => validate_number(value, scale),
        ParameterTypeKind::Boolean => {
            let lower = value.to_lowercase();
            if TRUE_LITERALS.contains(&lower.as_str()) || FALSE_LITERALS.contains(&lower.as_str()) {
                Ok(())
            } else {
                Err(ValidationError::NotABoolean {
                    value: value.to_string(),
                })
            }
        }
        ParameterTypeKind::Text => Ok(()),
        ParameterTypeKind::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| ValidationError::InvalidDate {
                value: value.to_string(),
                expected: "date (YYYY-MM-DD)",
            }),
        ParameterTypeKind::DateTime => {
            let parsed = DateTime::parse_from_rfc3339(value).is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok();
            if parsed {
                Ok(())
            } else {
                Err(ValidationError::InvalidDate {
                    value: value.to_string(),
                    expected: "date-time (RFC 3339)",
                })
            }
        }
        ParameterTypeKind::Enumeration {
            literals,
            allow_multi_select,
        } => {
            let selected: Vec<&str> = value.split('|').map(str::trim).collect();
            if selected.len() > 1 && !allow_multi_select {
                return Err(ValidationError::MultiSelectNotAllowed {
                    value: value.to_string(),
                });
            }
            match selected.iter().find(|s| !literals.iter().any(|l| l == *s)) {
                Some(unknown) => Err(ValidationError::NotAnEnumerationLiteral {
                    value: (*unknown).to_string(),
                    allowed: literals.clone(),
                }),
                None => Ok(()),
            }
        }
        ParameterTypeKind::Array { component, .. } => validate_kind(component, value, scale),
        ParameterTypeKind::SampledFunction { independent, .. } => match independent.first() {
            Some(first) => validate_kind(&first.kind, value, first.scale.as_ref()),
            None => Ok(()),
        },
    }
}

fn validate_number(value: &str, scale: Option<&MeasurementScale>) -> Result<(), ValidationError> {
    let number: f64 = value.parse().map_err(|_| ValidationError::NotANumber {
        value: value.to_string(),
    })?;

    let Some(scale) = scale else {
        return Ok(());
    };

    if !scale.number_set.contains(number) {
        return Err(ValidationError::NumberSetViolation {
            value: value.to_string(),
            number_set: scale.number_set,
        });
    }

    if !scale.in_range(number) {
        return Err(ValidationError::OutOfRange {
            value: number,
            scale: scale.short_name.clone(),
        });
    }

    Ok(())
}
