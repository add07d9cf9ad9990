use crate::{catalog, evaluate, lex, parser, translate};

/// Any failure from parsing through compilation or evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] lex::Error),
    #[error(transparent)]
    Parse(#[from] parser::Error),
    #[error(transparent)]
    Evaluate(#[from] evaluate::Error),
    #[error(transparent)]
    Catalog(#[from] catalog::Error),
    #[error(transparent)]
    Translate(#[from] translate::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Valid input this crate, or the chosen dialect, cannot express.
    pub fn is_not_implemented(&self) -> bool {
        matches!(
            self,
            Self::Evaluate(evaluate::Error::NotImplemented { .. })
                | Self::Translate(translate::Error::NotImplemented { .. })
        )
    }

    /// Input the client got wrong: syntax, unknown names and type errors.
    pub fn is_bad_request(&self) -> bool {
        match self {
            Self::Lex(_) | Self::Parse(_) | Self::Catalog(_) => true,
            Self::Evaluate(e) => !matches!(e, evaluate::Error::NotImplemented { .. }),
            Self::Translate(e) => !matches!(e, translate::Error::NotImplemented { .. }),
        }
    }

    /// Byte offset into the query option text, for syntax errors.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Lex(e) => Some(e.position()),
            Self::Parse(e) => e.position(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::Dialect;

    #[test]
    fn classification() {
        let syntax: Error = parser::Error::UnbalancedParentheses { position: 4 }.into();
        assert!(syntax.is_bad_request());
        assert!(!syntax.is_not_implemented());
        assert_eq!(syntax.position(), Some(4));

        let unsupported: Error = translate::Error::NotImplemented {
            dialect: Dialect::SqlServer,
            feature: "mod".into(),
        }
        .into();
        assert!(unsupported.is_not_implemented());
        assert!(!unsupported.is_bad_request());
        assert_eq!(unsupported.position(), None);

        let arithmetic: Error = evaluate::Error::DivisionByZero.into();
        assert!(arithmetic.is_bad_request());
    }

    #[test]
    fn catalog_errors_inside_translation_stay_bad_requests() {
        let error: Error = translate::Error::Catalog(catalog::Error::PropertyNotFilterable {
            name: "secret".into(),
        })
        .into();
        assert!(error.is_bad_request());
        assert_eq!(error.to_string(), "property 'secret' cannot be used in $filter");
    }
}
