use std::fmt::{Display, Formatter};

/// The canonical OData built-in functions. Names are matched case-sensitively,
///  the way the protocol spells them.
#[derive(
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[strum(serialize_all = "lowercase")]
pub enum Function {
    // String
    Contains,
    StartsWith,
    EndsWith,
    IndexOf,
    Length,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    #[strum(serialize = "matchesPattern")]
    MatchesPattern,

    // Date and time
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    FractionalSeconds,
    Date,
    Time,
    TotalOffsetMinutes,
    TotalSeconds,
    Now,
    MaxDateTime,
    MinDateTime,

    // Arithmetic
    Round,
    Floor,
    Ceiling,
}

/// How many arguments a function accepts, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    const fn exactly(n: usize) -> Self {
        Self { min: n, max: n }
    }

    #[inline]
    pub fn accepts(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.min == self.max {
            write!(f, "exactly {}", self.min)
        } else {
            write!(f, "between {} and {}", self.min, self.max)
        }
    }
}

impl Function {
    pub fn arity(self) -> Arity {
        use Function::*;
        match self {
            Now | MaxDateTime | MinDateTime => Arity::exactly(0),
            Length | ToLower | ToUpper | Trim | Year | Month | Day | Hour | Minute | Second
            | FractionalSeconds | Date | Time | TotalOffsetMinutes | TotalSeconds | Round
            | Floor | Ceiling => Arity::exactly(1),
            Contains | StartsWith | EndsWith | IndexOf | Concat | MatchesPattern => {
                Arity::exactly(2)
            }
            Substring => Arity { min: 2, max: 3 },
        }
    }

    /// contains, startswith and endswith only appear where a boolean
    ///  condition is expected when compiled to SQL.
    pub fn is_string_predicate(self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn names_round_trip() {
        for function in Function::iter() {
            assert_eq!(Function::from_str(&function.to_string()), Ok(function));
        }
        assert_eq!(Function::MatchesPattern.to_string(), "matchesPattern");
        assert_eq!(Function::FractionalSeconds.to_string(), "fractionalseconds");
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!(Function::from_str("Contains").is_err());
        assert!(Function::from_str("matchespattern").is_err());
    }

    #[test]
    fn arity() {
        assert!(Function::Substring.arity().accepts(3));
        assert!(!Function::Concat.arity().accepts(3));
        assert_eq!(Function::Concat.arity().to_string(), "exactly 2");
        assert_eq!(Function::Substring.arity().to_string(), "between 2 and 3");
    }
}
