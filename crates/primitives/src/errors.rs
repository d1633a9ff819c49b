use thiserror::Error;

/// Arithmetic failures on monetary amounts.
///
/// Amounts never wrap or truncate silently, every operation that could leave
/// the representable range reports one of these instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount overflow")]
    Overflow,

    #[error("amount underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,

    /// The value exceeds the maximum supply of the unit.
    #[error("amount {0} exceeds the maximum supply")]
    AboveMaxSupply(u128),
}
