//! Element path expressions.
//!
//! A small XPath subset used both as index extraction rules and as component
//! selectors:
//!
//! ```text
//! /reflection/apis/api        absolute, anchored at the root element
//! reflection/apis/api         same thing when evaluated against a document
//! //referenceLink             any descendant
//! apis//api[@id]              descendant below `apis`, with an `id` attribute
//! topic[@id='welcome']        attribute value predicate
//! */summary                   wildcard step
//! .                           the context element itself
//! ```

use std::fmt;
use std::str::FromStr;

use docweave_shared::{DocweaveError, Result};

/// Anything that has an element name and attributes.
pub trait PathNode {
    fn node_name(&self) -> &str;
    fn node_attr(&self, key: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    HasAttr(String),
    AttrEquals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicate: Option<Predicate>,
}

impl Step {
    fn accepts<N: PathNode + ?Sized>(&self, node: &N) -> bool {
        let name_ok = match &self.test {
            NameTest::Any => true,
            NameTest::Name(name) => node.node_name() == name,
        };
        name_ok
            && match &self.predicate {
                None => true,
                Some(Predicate::HasAttr(key)) => node.node_attr(key).is_some(),
                Some(Predicate::AttrEquals(key, value)) => {
                    node.node_attr(key) == Some(value.as_str())
                }
            }
    }
}

/// A parsed element path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPath {
    source: String,
    absolute: bool,
    self_only: bool,
    steps: Vec<Step>,
}

impl ElementPath {
    pub fn parse(expr: &str) -> Result<Self> {
        let source = expr.trim().to_string();
        if source.is_empty() {
            return Err(DocweaveError::parse("empty element path"));
        }
        if source == "." {
            return Ok(Self {
                source,
                absolute: false,
                self_only: true,
                steps: Vec::new(),
            });
        }

        let mut rest = source.strip_prefix("./").unwrap_or(&source);
        let absolute = rest.starts_with('/');
        let mut steps = Vec::new();
        let mut axis = Axis::Child;

        if let Some(stripped) = rest.strip_prefix("//") {
            axis = Axis::Descendant;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        }

        // Split on '/' outside of predicate brackets. An empty segment marks `//`.
        let mut segment = String::new();
        let mut in_predicate = false;
        let mut segments = Vec::new();
        for ch in rest.chars() {
            match ch {
                '[' => {
                    in_predicate = true;
                    segment.push(ch);
                }
                ']' => {
                    in_predicate = false;
                    segment.push(ch);
                }
                '/' if !in_predicate => segments.push(std::mem::take(&mut segment)),
                _ => segment.push(ch),
            }
        }
        segments.push(segment);

        for seg in segments {
            if seg.is_empty() {
                if axis == Axis::Descendant {
                    return Err(invalid(&source, "'///' is not allowed"));
                }
                axis = Axis::Descendant;
                continue;
            }
            steps.push(parse_step(&source, &seg, axis)?);
            axis = Axis::Child;
        }

        if steps.is_empty() || axis == Axis::Descendant {
            return Err(invalid(&source, "path must end with an element step"));
        }

        Ok(Self {
            source,
            absolute,
            self_only: false,
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// `true` for the `.` expression.
    pub fn is_self(&self) -> bool {
        self.self_only
    }

    /// `true` when every step uses the child axis, so matches sit at a fixed depth.
    pub fn is_fixed_depth(&self) -> bool {
        self.steps.iter().all(|s| s.axis == Axis::Child)
    }

    /// Number of steps (for fixed-depth paths, the depth of every match).
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    /// Test a chain of elements, from the first element below the context down
    /// to the candidate, against this path.
    pub fn matches<N: PathNode>(&self, chain: &[N]) -> bool {
        if self.self_only {
            return chain.is_empty();
        }
        !chain.is_empty() && match_steps(&self.steps, chain)
    }
}

fn match_steps<N: PathNode>(steps: &[Step], chain: &[N]) -> bool {
    let Some((step, rest)) = steps.split_first() else {
        return chain.is_empty();
    };
    match step.axis {
        Axis::Child => chain
            .first()
            .is_some_and(|node| step.accepts(node) && match_steps(rest, &chain[1..])),
        Axis::Descendant => {
            (0..chain.len()).any(|i| step.accepts(&chain[i]) && match_steps(rest, &chain[i + 1..]))
        }
    }
}

fn parse_step(source: &str, seg: &str, axis: Axis) -> Result<Step> {
    let (name, predicate) = match seg.find('[') {
        Some(open) => {
            let Some(body) = seg[open + 1..].strip_suffix(']') else {
                return Err(invalid(source, "unterminated predicate"));
            };
            (&seg[..open], Some(parse_predicate(source, body)?))
        }
        None => (seg, None),
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(invalid(source, "missing element name"));
    }
    let test = if name == "*" {
        NameTest::Any
    } else {
        NameTest::Name(name.to_string())
    };

    Ok(Step {
        axis,
        test,
        predicate,
    })
}

fn parse_predicate(source: &str, body: &str) -> Result<Predicate> {
    let Some(body) = body.trim().strip_prefix('@') else {
        return Err(invalid(source, "only attribute predicates are supported"));
    };
    match body.split_once('=') {
        None => Ok(Predicate::HasAttr(body.trim().to_string())),
        Some((key, value)) => {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                .ok_or_else(|| invalid(source, "predicate value must be quoted"))?;
            Ok(Predicate::AttrEquals(
                key.trim().to_string(),
                unquoted.to_string(),
            ))
        }
    }
}

fn invalid(source: &str, reason: &str) -> DocweaveError {
    DocweaveError::parse(format!("invalid element path '{source}': {reason}"))
}

impl FromStr for ElementPath {
    type Err = DocweaveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl<N: PathNode + ?Sized> PathNode for &N {
    fn node_name(&self) -> &str {
        (**self).node_name()
    }

    fn node_attr(&self, key: &str) -> Option<&str> {
        (**self).node_attr(key)
    }
}
