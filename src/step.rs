/// Result of advancing a coroutine: either it suspended with a value, or it finished.
///
/// A coroutine that reaches a suspension point returns `Yielded`, one that runs
/// off its end returns `Complete`.
///
/// ```rust
/// use strand::Step;
///
/// let suspended: Step<&str, u32> = Step::Yielded("waiting");
/// assert!(suspended.is_yielded());
/// assert_eq!(suspended.map_yielded(str::len), Step::Yielded(7));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step<Y, D> {
    /// Suspended at a suspension point
    Yielded(Y),
    /// Ran to termination
    Complete(D),
}

impl<Y, D> Step<Y, D> {
    #[inline]
    pub const fn is_yielded(&self) -> bool {
        matches!(self, Step::Yielded(_))
    }

    #[inline]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Step::Complete(_))
    }

    /// Maps the suspension value, leaving a completion untouched.
    #[inline]
    pub fn map_yielded<Y2, F>(self, f: F) -> Step<Y2, D>
    where
        F: FnOnce(Y) -> Y2,
    {
        match self {
            Step::Yielded(y) => Step::Yielded(f(y)),
            Step::Complete(d) => Step::Complete(d),
        }
    }

    #[inline]
    pub fn unwrap_yielded(self) -> Y {
        match self {
            Step::Yielded(y) => y,
            Step::Complete(_) => panic!("called `Step::unwrap_yielded()` on a `Complete` value"),
        }
    }

    #[inline]
    pub fn unwrap_complete(self) -> D {
        match self {
            Step::Yielded(_) => panic!("called `Step::unwrap_complete()` on a `Yielded` value"),
            Step::Complete(d) => d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_yielded_leaves_completion_alone() {
        let suspended: Step<u8, &str> = Step::Yielded(2);
        let finished: Step<u8, &str> = Step::Complete("done");

        assert_eq!(suspended.map_yielded(|n| n * 10), Step::Yielded(20));
        assert_eq!(finished.map_yielded(|n| n * 10), Step::Complete("done"));
        assert!(finished.is_complete() && !finished.is_yielded());
    }

    #[test]
    #[should_panic(expected = "called `Step::unwrap_complete()` on a `Yielded` value")]
    fn test_unwrap_complete_panics_on_suspension() {
        Step::<u8, u8>::Yielded(1).unwrap_complete();
    }
}
