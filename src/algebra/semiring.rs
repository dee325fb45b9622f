//! Semirings: an additive commutative monoid paired with a
//! multiplicative operator
//!
//! A semiring carries its multiplicative identities explicitly, one per
//! input domain, so that pattern (value-free) containers can substitute
//! them for missing values and `add_identity` can inject diagonal ones.

use num_traits::{Bounded, Num};

use super::ops::{LogicalAnd, LogicalOr, Max, Min, Plus, Times};
use super::{BinaryOperator, Monoid};

/// A semiring `(⊕, ⊗, 0, 1)` over domains `D1 x D2 -> D3`.
///
/// The additive monoid `A` operates on `D3` and must be commutative; the
/// multiplicative operator `M` maps `D1 x D2` into `D3`. The
/// multiplicative identity is stored per input domain (`one_left`,
/// `one_right`), which is what kernels substitute for the values of
/// pattern matrices.
#[derive(Debug, Clone, Copy)]
pub struct Semiring<A, M>
where
    A: Monoid,
    M: BinaryOperator<Out = <A as Monoid>::Elem>,
{
    add: A,
    mul: M,
    one_left: M::Left,
    one_right: M::Right,
}

impl<A, M> Semiring<A, M>
where
    A: Monoid,
    M: BinaryOperator<Out = <A as Monoid>::Elem>,
{
    /// Couple an additive monoid with a multiplicative operator.
    ///
    /// The caller supplies the multiplicative identities for the two
    /// input domains; `one_left ⊗ x == x` and `x ⊗ one_right == x` must
    /// hold for the resulting structure to be a semiring.
    pub fn new(add: A, mul: M, one_left: M::Left, one_right: M::Right) -> Self {
        Self {
            add,
            mul,
            one_left,
            one_right,
        }
    }

    /// The additive identity.
    #[inline]
    pub fn zero(&self) -> A::Elem {
        self.add.identity()
    }

    /// The multiplicative identity in the left input domain.
    #[inline]
    pub fn one_left(&self) -> M::Left {
        self.one_left
    }

    /// The multiplicative identity in the right input domain.
    #[inline]
    pub fn one_right(&self) -> M::Right {
        self.one_right
    }

    /// The multiplicative identity mapped into the output domain.
    #[inline]
    pub fn one(&self) -> A::Elem {
        self.mul.apply(self.one_left, self.one_right)
    }

    /// Semiring addition.
    #[inline]
    pub fn add(&self, a: A::Elem, b: A::Elem) -> A::Elem {
        Monoid::apply(&self.add, a, b)
    }

    /// Semiring multiplication.
    #[inline]
    pub fn mul(&self, a: M::Left, b: M::Right) -> A::Elem {
        self.mul.apply(a, b)
    }

    /// The additive monoid.
    #[inline]
    pub fn additive(&self) -> &A {
        &self.add
    }

    /// The multiplicative operator.
    #[inline]
    pub fn multiplicative(&self) -> &M {
        &self.mul
    }
}

/// The conventional arithmetic semiring `(+, *, 0, 1)`.
pub fn plus_times<T: Copy + Num>() -> Semiring<Plus<T>, Times<T>> {
    Semiring::new(Plus::new(), Times::new(), T::one(), T::one())
}

/// The tropical semiring `(min, +, ∞, 0)` used for shortest paths.
pub fn min_plus<T: Copy + Num + PartialOrd + Bounded>() -> Semiring<Min<T>, Plus<T>> {
    Semiring::new(Min::new(), Plus::new(), T::zero(), T::zero())
}

/// The `(max, *, -∞, 1)` semiring used for widest-path style problems.
pub fn max_times<T: Copy + Num + PartialOrd + Bounded>() -> Semiring<Max<T>, Times<T>> {
    Semiring::new(Max::new(), Times::new(), T::one(), T::one())
}

/// The boolean semiring `(||, &&, false, true)` used for reachability.
pub fn or_and() -> Semiring<LogicalOr, LogicalAnd> {
    Semiring::new(LogicalOr, LogicalAnd, true, true)
}
