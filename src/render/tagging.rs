//! Builds the structure tree from the tag tokens attached to text lines.
//!
//! The tokens arrive flat and page-broken: a table split across two pages is
//! closed with a onetime pop at the break and continued with fresh opens on the
//! next page. The engine keeps a stack of open elements rooted at `Document`
//! and never aborts on malformed input; every anomaly becomes a [`TagWarning`].

use std::collections::VecDeque;
use std::fmt;

use super::policy;
use crate::backend::{Backend, SpanId};
use crate::model::{TagToken, TextLine};
use crate::structure::{ElementId, StructureTree};

/// A recoverable problem found while reconciling tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagWarning {
    /// `child` opened under a parent whose nesting policy rejects it.
    NestingViolation { parent: String, child: String, text: String },
    /// An open tag on a line without `startsNode`.
    MissingStartsNode { token: String, text: String },
    /// A close or onetime pop on a line without `endsNode`.
    MissingEndsNode { token: String, text: String },
    /// Tags on a line that neither starts nor ends a node.
    UnflaggedTags { tags: String, text: String },
    /// A close tag that does not name the innermost open element.
    MismatchedClose { open: String, close: String, text: String },
    /// A onetime pop asked for more levels than were open below the root.
    OnetimeClamped { requested: u32, applied: u32 },
    /// A span ended with no element to own it.
    ContentWithoutElement { tag: String, text: String },
    /// An element closed with no span attached at this boundary.
    ElementWithoutContent { element: String, text: String },
    /// An element still open when the pass ended.
    DanglingElement { element: String },
}

impl fmt::Display for TagWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagWarning::NestingViolation { parent, child, text } => {
                write!(f, "<{child}> is not allowed inside <{parent}> (line {text:?})")
            }
            TagWarning::MissingStartsNode { token, text } => {
                write!(f, "open tag {token} on a line that does not start a node (line {text:?})")
            }
            TagWarning::MissingEndsNode { token, text } => {
                write!(f, "{token} on a line that does not end a node (line {text:?})")
            }
            TagWarning::UnflaggedTags { tags, text } => {
                write!(f, "tags [{tags}] ignored, line neither starts nor ends a node (line {text:?})")
            }
            TagWarning::MismatchedClose { open, close, text } => {
                write!(f, "close tag /{close} does not match open <{open}> (line {text:?})")
            }
            TagWarning::OnetimeClamped { requested, applied } => {
                write!(f, "onetime pop of {requested} clamped to {applied}")
            }
            TagWarning::ContentWithoutElement { tag, text } => {
                write!(f, "marked content <{tag}> has no owning element (line {text:?})")
            }
            TagWarning::ElementWithoutContent { element, text } => {
                write!(f, "element <{element}> closed without content (line {text:?})")
            }
            TagWarning::DanglingElement { element } => {
                write!(f, "element <{element}> was never closed")
            }
        }
    }
}

/// What a structural line left for [`StructureTagEngine::end_line`].
#[derive(Debug)]
pub struct LineBoundary {
    /// Elements popped by this line, in pop order.
    pending: VecDeque<ElementId>,
    /// Span opened by this line.
    span: Option<SpanId>,
}

pub struct StructureTagEngine {
    tree: StructureTree,
    stack: Vec<ElementId>,
    open_spans: Vec<(SpanId, String)>,
    warnings: Vec<TagWarning>,
}

impl Default for StructureTagEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureTagEngine {
    pub fn new() -> Self {
        Self {
            tree: StructureTree::new(),
            stack: Vec::new(),
            open_spans: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn tree(&self) -> &StructureTree {
        &self.tree
    }

    pub fn warnings(&self) -> &[TagWarning] {
        &self.warnings
    }

    /// Open elements including the root.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn root(&mut self) -> ElementId {
        match self.stack.first() {
            Some(&root) => root,
            None => {
                let root = self.tree.create_root();
                self.stack.push(root);
                root
            }
        }
    }

    fn top(&self) -> ElementId {
        // The root is pushed before any token is looked at and never popped.
        self.stack[self.stack.len() - 1]
    }

    fn stack_names(&self) -> String {
        self.stack
            .iter()
            .map(|&id| self.tree.name(id))
            .collect::<Vec<_>>()
            .join("/")
    }

    fn warn(&mut self, warning: TagWarning, line: Option<&TextLine>) {
        match line {
            Some(line) => log::warn!(
                "{warning}; tags [{}], stack [{}]",
                format_tags(&line.tags),
                self.stack_names()
            ),
            None => log::warn!("{warning}; stack [{}]", self.stack_names()),
        }
        self.warnings.push(warning);
    }

    /// Process the line's tags before its content is drawn. Returns `None`
    /// when the line takes no part in structure.
    pub fn begin_line(
        &mut self,
        line: &TextLine,
        backend: &mut dyn Backend,
    ) -> Option<LineBoundary> {
        if line.tags.is_empty() {
            return None;
        }
        if !line.carries_structure() {
            self.warn(
                TagWarning::UnflaggedTags {
                    tags: format_tags(&line.tags),
                    text: line.visible_text(),
                },
                Some(line),
            );
            return None;
        }

        self.root();
        let mut pending = VecDeque::new();
        let mut last_opened: Option<ElementId> = None;

        for token in &line.tags {
            match token {
                TagToken::Open(name) => {
                    if !line.starts_node {
                        self.warn(
                            TagWarning::MissingStartsNode {
                                token: token.to_string(),
                                text: line.visible_text(),
                            },
                            Some(line),
                        );
                        continue;
                    }
                    let parent = self.top();
                    let parent_name = self.tree.name(parent).to_string();
                    if !policy::is_allowed(&parent_name, name) {
                        self.warn(
                            TagWarning::NestingViolation {
                                parent: parent_name,
                                child: name.clone(),
                                text: line.visible_text(),
                            },
                            Some(line),
                        );
                    }
                    let id = self.tree.add_child(parent, name);
                    self.stack.push(id);
                    last_opened = Some(id);
                }
                TagToken::Close(name) => {
                    if !line.ends_node {
                        self.warn(
                            TagWarning::MissingEndsNode {
                                token: token.to_string(),
                                text: line.visible_text(),
                            },
                            Some(line),
                        );
                        continue;
                    }
                    let top = self.top();
                    if self.stack.len() <= 1 || self.tree.name(top) != name {
                        self.warn(
                            TagWarning::MismatchedClose {
                                open: self.tree.name(top).to_string(),
                                close: name.clone(),
                                text: line.visible_text(),
                            },
                            Some(line),
                        );
                        continue;
                    }
                    self.stack.pop();
                    pending.push_back(top);
                }
                TagToken::OnetimePop(requested) => {
                    if !line.ends_node {
                        self.warn(
                            TagWarning::MissingEndsNode {
                                token: token.to_string(),
                                text: line.visible_text(),
                            },
                            Some(line),
                        );
                        continue;
                    }
                    let poppable = u32::try_from(self.stack.len() - 1).unwrap_or(u32::MAX);
                    let applied = (*requested).min(poppable);
                    if applied < *requested {
                        self.warn(
                            TagWarning::OnetimeClamped {
                                requested: *requested,
                                applied,
                            },
                            Some(line),
                        );
                    }
                    for _ in 0..applied {
                        if let Some(id) = self.stack.pop() {
                            pending.push_back(id);
                        }
                    }
                }
            }
        }

        let span = match last_opened {
            Some(id) if line.starts_node => {
                let tag = self.tree.name(id).to_string();
                let span = backend.begin_span(&tag);
                self.open_spans.push((span, tag));
                Some(span)
            }
            _ => None,
        };

        Some(LineBoundary { pending, span })
    }

    /// Attach and close after the line's content was drawn.
    pub fn end_line(&mut self, line: &TextLine, boundary: LineBoundary, backend: &mut dyn Backend) {
        if !line.ends_node {
            return;
        }
        let LineBoundary { mut pending, span } = boundary;

        // This line's span is the newest open one; otherwise take the newest
        // span left open by an earlier line.
        debug_assert!(span.is_none() || self.open_spans.last().map(|s| s.0) == span);
        let span = self.open_spans.pop();
        let element = pending.pop_front();

        match (&span, element) {
            (Some((span_id, _)), Some(element)) => self.tree.attach_content(element, *span_id),
            (Some((_, tag)), None) => {
                let tag = tag.clone();
                self.warn(
                    TagWarning::ContentWithoutElement {
                        tag,
                        text: line.visible_text(),
                    },
                    Some(line),
                );
            }
            (None, Some(element)) => {
                let name = self.tree.name(element).to_string();
                self.warn(
                    TagWarning::ElementWithoutContent {
                        element: name,
                        text: line.visible_text(),
                    },
                    Some(line),
                );
            }
            (None, None) => {}
        }

        if let Some((span_id, _)) = span {
            backend.end_span(span_id);
        }
        for id in element.into_iter().chain(pending) {
            self.tree.close(id);
        }
    }

    /// End of pass: report dangling elements, end leftover spans, close the
    /// root and hand the tree to the backend.
    pub fn finish(mut self, backend: &mut dyn Backend) -> (StructureTree, Vec<TagWarning>) {
        let dangling: Vec<ElementId> = self.stack.iter().skip(1).copied().collect();
        for id in dangling {
            let element = self.tree.name(id).to_string();
            self.warn(TagWarning::DanglingElement { element }, None);
        }
        while let Some((span, tag)) = self.open_spans.pop() {
            log::debug!("Ending span <{tag}> left open at end of document");
            backend.end_span(span);
        }
        if let Some(&root) = self.stack.first() {
            self.tree.close(root);
        }
        backend.finish_structure(&self.tree);
        (self.tree, self.warnings)
    }
}

fn format_tags(tags: &[TagToken]) -> String {
    tags.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
