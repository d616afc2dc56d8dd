//! Parsing of prefixed API member ids (`T:Ns.Type`, `M:Ns.Type.Run(System.String)`).

use std::sync::LazyLock;

use regex::Regex;

use docweave_shared::LinkKind;

static API_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([NTMPFERG]):([^(]+?)(?:\((.*)\))?(?:~.*)?$").expect("valid regex")
});

static ARITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`+\d+").expect("valid regex"));

/// A parsed API id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiId {
    raw: String,
    prefix: char,
    member_path: String,
    parameters: Option<String>,
}

impl ApiId {
    /// Parse `id`, returning `None` when it carries no recognised prefix.
    pub fn parse(id: &str) -> Option<Self> {
        let caps = API_ID_RE.captures(id.trim())?;
        let prefix = caps.get(1)?.as_str().chars().next()?;
        let member_path = caps.get(2)?.as_str().trim().to_string();
        if member_path.is_empty() {
            return None;
        }
        Some(Self {
            raw: id.trim().to_string(),
            prefix,
            member_path,
            parameters: caps.get(3).map(|m| m.as_str().to_string()),
        })
    }

    /// `true` when `id` starts with a recognised `X:` prefix.
    pub fn has_prefix(id: &str) -> bool {
        Self::parse(id).is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    pub fn kind(&self) -> LinkKind {
        match self.prefix {
            'N' => LinkKind::Namespace,
            'T' => LinkKind::Type,
            'M' | 'P' | 'F' | 'E' => LinkKind::Member,
            'G' => LinkKind::ConceptualTopic,
            _ => LinkKind::Other,
        }
    }

    /// Dotted path without prefix and parameters.
    pub fn member_path(&self) -> &str {
        &self.member_path
    }

    pub fn parameters(&self) -> Option<&str> {
        self.parameters.as_deref()
    }

    /// Simple display name: the last path segment, with generic arity
    /// markers removed and constructors shown as their type name.
    pub fn name(&self) -> String {
        let segments: Vec<&str> = self.member_path.split('.').collect();
        let last = segments.last().copied().unwrap_or_default();
        let name = if (last == "#ctor" || last == "#cctor") && segments.len() > 1 {
            segments[segments.len() - 2]
        } else {
            // Explicit interface implementations: `Ns#IFace#Member`.
            last.rsplit('#').next().unwrap_or(last)
        };
        ARITY_RE.replace_all(name, "").into_owned()
    }
}

impl std::fmt::Display for ApiId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Id prefixes tried for an unprefixed id when the caller prefers `kind`.
pub fn kind_prefixes(kind: LinkKind) -> &'static [&'static str] {
    match kind {
        LinkKind::Namespace => &["N:"],
        LinkKind::Type => &["T:"],
        LinkKind::Member => &["M:", "P:", "F:", "E:"],
        LinkKind::ConceptualTopic => &["G:"],
        LinkKind::Other => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixes_and_parameters() {
        let id = ApiId::parse("M:Demo.Widget.Spin(System.Int32,System.String)").unwrap();
        assert_eq!(id.prefix(), 'M');
        assert_eq!(id.kind(), LinkKind::Member);
        assert_eq!(id.member_path(), "Demo.Widget.Spin");
        assert_eq!(id.parameters(), Some("System.Int32,System.String"));
        assert_eq!(id.name(), "Spin");

        let ns = ApiId::parse("N:Demo").unwrap();
        assert_eq!(ns.kind(), LinkKind::Namespace);
        assert_eq!(ns.name(), "Demo");
        assert_eq!(ns.parameters(), None);
    }

    #[test]
    fn display_names() {
        assert_eq!(ApiId::parse("T:Demo.List`1").unwrap().name(), "List");
        assert_eq!(ApiId::parse("M:Demo.Widget.#ctor").unwrap().name(), "Widget");
        assert_eq!(
            ApiId::parse("M:Demo.Map`2.Get``1(``0)").unwrap().name(),
            "Get"
        );
        assert_eq!(
            ApiId::parse("M:Demo.Widget.Demo#IDisposable#Dispose").unwrap().name(),
            "Dispose"
        );
        assert_eq!(
            ApiId::parse("M:Demo.Widget.op_Implicit(Demo.Widget)~System.Int32")
                .unwrap()
                .name(),
            "op_Implicit"
        );
    }

    #[test]
    fn unprefixed_ids_are_not_api_ids() {
        assert!(ApiId::parse("Demo.Widget").is_none());
        assert!(ApiId::parse("X:Demo").is_none());
        assert!(ApiId::parse("T:").is_none());
        assert!(!ApiId::has_prefix("d0c6a1b2-welcome"));
        assert!(ApiId::has_prefix("G:d0c6a1b2"));
    }

    #[test]
    fn prefixes_for_kinds() {
        assert_eq!(kind_prefixes(LinkKind::Type), &["T:"]);
        assert_eq!(kind_prefixes(LinkKind::Member).len(), 4);
        assert!(kind_prefixes(LinkKind::Other).is_empty());
    }
}
