//! The logical structure tree built during a render pass.
//!
//! Elements live in an arena and refer to each other by [`ElementId`], so the
//! open-element stack and parent links never form ownership cycles.

use crate::backend::SpanId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructureChild {
    Element(ElementId),
    Content(SpanId),
}

#[derive(Clone, Debug)]
pub struct StructureElement {
    pub name: String,
    pub parent: Option<ElementId>,
    pub children: Vec<StructureChild>,
    pub closed: bool,
}

#[derive(Clone, Debug, Default)]
pub struct StructureTree {
    elements: Vec<StructureElement>,
}

impl StructureTree {
    pub const ROOT_NAME: &'static str = "Document";

    pub fn new() -> Self {
        Self::default()
    }

    /// The document root, if any structure was ever opened.
    pub fn root(&self) -> Option<ElementId> {
        (!self.elements.is_empty()).then_some(ElementId(0))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn create_root(&mut self) -> ElementId {
        debug_assert!(self.elements.is_empty());
        self.elements.push(StructureElement {
            name: Self::ROOT_NAME.to_string(),
            parent: None,
            children: Vec::new(),
            closed: false,
        });
        ElementId(0)
    }

    pub(crate) fn add_child(&mut self, parent: ElementId, name: &str) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(StructureElement {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            closed: false,
        });
        self.elements[parent.0]
            .children
            .push(StructureChild::Element(id));
        id
    }

    pub(crate) fn attach_content(&mut self, element: ElementId, span: SpanId) {
        self.elements[element.0]
            .children
            .push(StructureChild::Content(span));
    }

    /// Returns false if the element had already been closed.
    pub(crate) fn close(&mut self, element: ElementId) -> bool {
        let el = &mut self.elements[element.0];
        !std::mem::replace(&mut el.closed, true)
    }

    pub fn get(&self, id: ElementId) -> &StructureElement {
        &self.elements[id.0]
    }

    pub fn name(&self, id: ElementId) -> &str {
        &self.elements[id.0].name
    }

    pub fn element_children(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        self.elements[id.0].children.iter().filter_map(|c| match c {
            StructureChild::Element(e) => Some(*e),
            StructureChild::Content(_) => None,
        })
    }

    pub fn content_children(&self, id: ElementId) -> impl Iterator<Item = SpanId> + '_ {
        self.elements[id.0].children.iter().filter_map(|c| match c {
            StructureChild::Content(s) => Some(*s),
            StructureChild::Element(_) => None,
        })
    }

    /// Elements in depth-first pre-order starting at the root.
    pub fn depth_first(&self) -> Vec<ElementId> {
        let mut out = Vec::with_capacity(self.elements.len());
        let mut stack: Vec<ElementId> = self.root().into_iter().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            let children: Vec<ElementId> = self.element_children(id).collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Compact s-expression of the element shape, e.g. `Document(Table(TR TR))`.
    /// Marked content is left out.
    pub fn outline(&self) -> String {
        fn write(tree: &StructureTree, id: ElementId, out: &mut String) {
            out.push_str(tree.name(id));
            let children: Vec<ElementId> = tree.element_children(id).collect();
            if !children.is_empty() {
                out.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    write(tree, *child, out);
                }
                out.push(')');
            }
        }
        let mut out = String::new();
        if let Some(root) = self.root() {
            write(self, root, &mut out);
        }
        out
    }
}
