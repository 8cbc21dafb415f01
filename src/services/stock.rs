//! Stock movement rules, independent of storage.

use thiserror::Error;

use crate::entities::MovementType;
use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockRuleError {
    #[error("{available} units available, {requested} requested")]
    Insufficient { available: i32, requested: i32 },
    #[error("quantity {quantidade} is not valid for a {tipo} movement")]
    InvalidQuantity { tipo: MovementType, quantidade: i32 },
    #[error("resulting quantity exceeds the supported range")]
    Overflow,
    #[error("part holds {actual} units but the adjustment set {expected}")]
    AdjustmentSuperseded { expected: i32, actual: i32 },
}

impl StockRuleError {
    /// Attaches the part code and maps to the service taxonomy.
    pub fn for_part(self, codigo: &str) -> ServiceError {
        match self {
            StockRuleError::Insufficient { .. } => {
                ServiceError::InsufficientStock(format!("part {} has {}", codigo, self))
            }
            StockRuleError::InvalidQuantity { .. } | StockRuleError::Overflow => {
                ServiceError::ValidationError(format!("part {}: {}", codigo, self))
            }
            StockRuleError::AdjustmentSuperseded { .. } => ServiceError::Conflict(format!(
                "cannot reverse adjustment on part {}: {}",
                codigo, self
            )),
        }
    }
}

/// Minimum accepted quantity: counts may be zero, flows must move something.
pub fn validate_quantity(tipo: MovementType, quantidade: i32) -> Result<(), StockRuleError> {
    let min = match tipo {
        MovementType::Ajuste => 0,
        MovementType::Entrada | MovementType::Saida => 1,
    };
    if quantidade < min {
        return Err(StockRuleError::InvalidQuantity { tipo, quantidade });
    }
    Ok(())
}

/// New current quantity after applying a movement to `current`.
pub fn next_quantity(
    current: i32,
    tipo: MovementType,
    quantidade: i32,
) -> Result<i32, StockRuleError> {
    validate_quantity(tipo, quantidade)?;
    match tipo {
        MovementType::Entrada => current
            .checked_add(quantidade)
            .ok_or(StockRuleError::Overflow),
        MovementType::Saida => {
            if quantidade > current {
                Err(StockRuleError::Insufficient {
                    available: current,
                    requested: quantidade,
                })
            } else {
                Ok(current - quantidade)
            }
        }
        MovementType::Ajuste => Ok(quantidade),
    }
}

/// Quantity after undoing a recorded movement.
///
/// `entrada` is taken back out (fails if already consumed), `saida` is put
/// back, and `ajuste` restores the previous snapshot only while the part
/// still holds the adjusted value.
pub fn reversed_quantity(
    current: i32,
    tipo: MovementType,
    quantidade: i32,
    quantidade_anterior: i32,
    quantidade_nova: i32,
) -> Result<i32, StockRuleError> {
    match tipo {
        MovementType::Entrada => next_quantity(current, MovementType::Saida, quantidade),
        MovementType::Saida => next_quantity(current, MovementType::Entrada, quantidade),
        MovementType::Ajuste => {
            if current == quantidade_nova {
                Ok(quantidade_anterior)
            } else {
                Err(StockRuleError::AdjustmentSuperseded {
                    expected: quantidade_nova,
                    actual: current,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(10, MovementType::Entrada, 5, 15)]
    #[case(10, MovementType::Saida, 3, 7)]
    #[case(10, MovementType::Saida, 10, 0)]
    #[case(10, MovementType::Ajuste, 7, 7)]
    #[case(10, MovementType::Ajuste, 0, 0)]
    #[case(0, MovementType::Ajuste, 25, 25)]
    fn applies_movement(
        #[case] current: i32,
        #[case] tipo: MovementType,
        #[case] quantidade: i32,
        #[case] expected: i32,
    ) {
        assert_eq!(next_quantity(current, tipo, quantidade), Ok(expected));
    }

    #[test]
    fn saida_beyond_stock_is_rejected() {
        assert_matches!(
            next_quantity(3, MovementType::Saida, 5),
            Err(StockRuleError::Insufficient {
                available: 3,
                requested: 5
            })
        );
    }

    #[rstest]
    #[case(MovementType::Entrada, 0)]
    #[case(MovementType::Saida, 0)]
    #[case(MovementType::Entrada, -3)]
    #[case(MovementType::Ajuste, -1)]
    fn rejects_invalid_quantities(#[case] tipo: MovementType, #[case] quantidade: i32) {
        assert_matches!(
            next_quantity(10, tipo, quantidade),
            Err(StockRuleError::InvalidQuantity { .. })
        );
    }

    #[test]
    fn entrada_overflow_is_reported() {
        assert_eq!(
            next_quantity(i32::MAX, MovementType::Entrada, 1),
            Err(StockRuleError::Overflow)
        );
    }

    #[test]
    fn reversal_of_each_kind() {
        assert_eq!(reversed_quantity(15, MovementType::Entrada, 5, 10, 15), Ok(10));
        assert_eq!(reversed_quantity(7, MovementType::Saida, 3, 10, 7), Ok(10));
        assert_eq!(reversed_quantity(7, MovementType::Ajuste, 7, 10, 7), Ok(10));
    }

    #[test]
    fn reversal_of_consumed_entrada_is_rejected() {
        assert_matches!(
            reversed_quantity(2, MovementType::Entrada, 5, 0, 5),
            Err(StockRuleError::Insufficient { .. })
        );
    }

    #[test]
    fn reversal_of_superseded_ajuste_is_a_conflict() {
        let err = reversed_quantity(9, MovementType::Ajuste, 7, 10, 7).unwrap_err();
        assert_matches!(err.clone().for_part("FLT-001"), ServiceError::Conflict(_));
    }

    #[test]
    fn errors_map_to_service_taxonomy() {
        assert_matches!(
            StockRuleError::Insufficient {
                available: 1,
                requested: 2
            }
            .for_part("X"),
            ServiceError::InsufficientStock(msg) if msg.contains("X") && msg.contains("1 units")
        );
        assert_matches!(
            StockRuleError::Overflow.for_part("X"),
            ServiceError::ValidationError(_)
        );
    }

    proptest! {
        #[test]
        fn quantity_never_goes_negative(
            start in 0i32..1_000,
            steps in prop::collection::vec((0u8..3, 0i32..500), 0..40),
        ) {
            let mut current = start;
            for (kind, q) in steps {
                let tipo = match kind {
                    0 => MovementType::Entrada,
                    1 => MovementType::Saida,
                    _ => MovementType::Ajuste,
                };
                if let Ok(next) = next_quantity(current, tipo, q) {
                    current = next;
                }
                prop_assert!(current >= 0);
            }
        }

        #[test]
        fn entrada_then_saida_round_trips(start in 0i32..10_000, q in 1i32..10_000) {
            let up = next_quantity(start, MovementType::Entrada, q).unwrap();
            prop_assert_eq!(next_quantity(up, MovementType::Saida, q).unwrap(), start);
        }
    }
}
