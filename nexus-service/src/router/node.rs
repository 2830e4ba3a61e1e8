//! Radix tree nodes and segment grammar

use regex::Regex;

use crate::error::{Error, Result};

/// One parsed path segment
///
/// Priority for matching is the declaration order of the variants:
/// static < pattern < regex < param < wildcard.
#[derive(Debug)]
pub(crate) enum Segment {
    /// Literal segment, e.g. `users`
    Static {
        /// The literal text
        literal: String,
    },
    /// Inline pattern mixing literals and bindings, e.g. `file.:ext` or
    /// `category-:slug(\w+)-:page(\d+)`; the compiled regex is anchored.
    Pattern {
        /// Original segment text, used for duplicate detection
        raw: String,
        /// Anchored regex with one capture group per binding
        regex: Regex,
        /// Binding names in capture order
        names: Vec<String>,
    },
    /// Single binding constrained by a regex, e.g. `:id(\d+)`
    CustomRegex {
        /// Original segment text
        raw: String,
        /// Binding name
        name: String,
        /// Anchored regex the whole segment must satisfy
        regex: Regex,
    },
    /// Unconstrained single binding, e.g. `:id`
    Param {
        /// Binding name
        name: String,
    },
    /// Trailing catch-all, e.g. `*rest`; consumes all remaining segments
    Wildcard {
        /// Binding name (`wildcard` for a bare `*`)
        name: String,
    },
}

impl Segment {
    /// Match priority; lower tries first
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Self::Static { .. } => 0,
            Self::Pattern { .. } => 1,
            Self::CustomRegex { .. } => 2,
            Self::Param { .. } => 3,
            Self::Wildcard { .. } => 4,
        }
    }

    /// The raw text two registrations must share to land on the same node
    pub(crate) fn raw(&self) -> &str {
        match self {
            Self::Static { literal } => literal,
            Self::Pattern { raw, .. } => raw,
            Self::CustomRegex { raw, .. } => raw,
            Self::Param { name } => name,
            Self::Wildcard { name } => name,
        }
    }

    /// Whether two segment specs describe the same node
    pub(crate) fn same_spec(&self, other: &Segment) -> bool {
        self.priority() == other.priority() && self.raw() == other.raw()
    }

    /// Parse one segment of a registered path
    pub(crate) fn parse(raw: &str, path: &str) -> Result<Self> {
        if let Some(name) = raw.strip_prefix('*') {
            let name = if name.is_empty() { "wildcard" } else { name };
            return Ok(Self::Wildcard {
                name: name.to_string(),
            });
        }

        let tokens = scan_bindings(raw, path)?;
        if tokens.is_empty() {
            return Ok(Self::Static {
                literal: raw.to_string(),
            });
        }

        // A single binding spanning the whole segment is a param or a
        // custom-regex segment; anything else compiles to an inline pattern.
        if tokens.len() == 1 {
            let token = &tokens[0];
            if token.start == 0 && token.end == raw.len() {
                return match &token.pattern {
                    None => Ok(Self::Param {
                        name: token.name.clone(),
                    }),
                    Some(pattern) => Ok(Self::CustomRegex {
                        raw: raw.to_string(),
                        name: token.name.clone(),
                        regex: compile_anchored(&format!("(?:{})", pattern), path)?,
                    }),
                };
            }
        }

        let mut source = String::new();
        let mut names = Vec::with_capacity(tokens.len());
        let mut cursor = 0;
        for token in &tokens {
            source.push_str(&regex::escape(&raw[cursor..token.start]));
            match &token.pattern {
                Some(pattern) => source.push_str(&format!("({})", pattern)),
                None => source.push_str("([^/]+)"),
            }
            names.push(token.name.clone());
            cursor = token.end;
        }
        source.push_str(&regex::escape(&raw[cursor..]));

        Ok(Self::Pattern {
            raw: raw.to_string(),
            regex: compile_anchored(&source, path)?,
            names,
        })
    }
}

/// A `:name` or `:name(regex)` occurrence inside a segment
struct Binding {
    start: usize,
    end: usize,
    name: String,
    pattern: Option<String>,
}

/// Scan a segment for `:name` / `:name(regex)` bindings
fn scan_bindings(segment: &str, path: &str) -> Result<Vec<Binding>> {
    let bytes = segment.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b':' {
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        let name_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        if i == name_start {
            return Err(Error::InvalidPattern {
                path: path.to_string(),
                reason: format!("parameter in segment '{}' has no name", segment),
            });
        }
        let name = segment[name_start..i].to_string();

        let mut pattern = None;
        if i < bytes.len() && bytes[i] == b'(' {
            let open = i;
            let mut depth = 0usize;
            let mut close = None;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => i += 1, // skip the escaped byte
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            close = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            let close = close.ok_or_else(|| Error::InvalidPattern {
                path: path.to_string(),
                reason: format!("unclosed '(' in segment '{}'", segment),
            })?;
            pattern = Some(segment[open + 1..close].to_string());
            i = close + 1;
        }

        tokens.push(Binding {
            start,
            end: i,
            name,
            pattern,
        });
    }
    Ok(tokens)
}

/// Compile `^source$`, mapping failures to registration errors
fn compile_anchored(source: &str, path: &str) -> Result<Regex> {
    Regex::new(&format!("^{}$", source)).map_err(|e| Error::InvalidPattern {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// One node of the radix tree, generic over the terminal payload
#[derive(Debug)]
pub(crate) struct Node<T> {
    pub(crate) segment: Segment,
    pub(crate) children: Vec<Node<T>>,
    pub(crate) route: Option<T>,
}

impl<T> Node<T> {
    /// Root pseudo-node; its segment text never participates in matching
    pub(crate) fn root() -> Self {
        Self {
            segment: Segment::Static {
                literal: String::new(),
            },
            children: Vec::new(),
            route: None,
        }
    }

    /// Descend into (or create) the child for a segment spec
    pub(crate) fn child_for(&mut self, segment: Segment) -> &mut Node<T> {
        if let Some(idx) = self
            .children
            .iter()
            .position(|c| c.segment.same_spec(&segment))
        {
            return &mut self.children[idx];
        }

        // Insert keeping children sorted by priority; insertion order is
        // preserved within the same priority class.
        let priority = segment.priority();
        let idx = self
            .children
            .iter()
            .position(|c| c.segment.priority() > priority)
            .unwrap_or(self.children.len());
        self.children.insert(
            idx,
            Node {
                segment,
                children: Vec::new(),
                route: None,
            },
        );
        &mut self.children[idx]
    }

    /// Depth-first search for a terminal node, trying children in priority
    /// order and restoring parameter captures when a branch fails.
    pub(crate) fn find<'a>(
        &'a self,
        segments: &[&str],
        idx: usize,
        params: &mut Vec<(String, String)>,
    ) -> Option<&'a Node<T>> {
        if idx == segments.len() {
            if self.route.is_some() {
                return Some(self);
            }
            // A trailing wildcard also matches the empty remainder.
            for child in &self.children {
                if let Segment::Wildcard { name } = &child.segment {
                    if child.route.is_some() {
                        params.push((name.clone(), String::new()));
                        return Some(child);
                    }
                }
            }
            return None;
        }

        let segment = segments[idx];
        for child in &self.children {
            let checkpoint = params.len();
            match &child.segment {
                Segment::Static { literal } => {
                    if literal == segment {
                        if let Some(found) = child.find(segments, idx + 1, params) {
                            return Some(found);
                        }
                    }
                }
                Segment::Pattern { regex, names, .. } => {
                    if let Some(captures) = regex.captures(segment) {
                        for (i, name) in names.iter().enumerate() {
                            if let Some(m) = captures.get(i + 1) {
                                params.push((name.clone(), m.as_str().to_string()));
                            }
                        }
                        if let Some(found) = child.find(segments, idx + 1, params) {
                            return Some(found);
                        }
                        params.truncate(checkpoint);
                    }
                }
                Segment::CustomRegex { regex, name, .. } => {
                    if regex.is_match(segment) {
                        params.push((name.clone(), segment.to_string()));
                        if let Some(found) = child.find(segments, idx + 1, params) {
                            return Some(found);
                        }
                        params.truncate(checkpoint);
                    }
                }
                Segment::Param { name } => {
                    params.push((name.clone(), segment.to_string()));
                    if let Some(found) = child.find(segments, idx + 1, params) {
                        return Some(found);
                    }
                    params.truncate(checkpoint);
                }
                Segment::Wildcard { name } => {
                    // Tried last by priority order; consumes the remainder
                    // and terminates, so there is nothing to backtrack into.
                    if child.route.is_some() {
                        params.push((name.clone(), segments[idx..].join("/")));
                        return Some(child);
                    }
                }
            }
        }
        None
    }
}
