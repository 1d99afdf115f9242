//! Operator derivation for single-field numeric newtypes.

/// Implements the standard arithmetic operator traits for a tuple newtype
/// wrapping a numeric primitive.
///
/// `op!(binary T, Add, add)` implements `Add for T`, `op!(inplace T,
/// SubAssign, sub_assign)` the in-place form, and `op!(unary T, Neg, neg)`
/// the unary form.
#[macro_export]
macro_rules! op {
    (binary $t:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $t:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0);
            }
        }
    };
    (unary $t:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0))
            }
        }
    };
}
