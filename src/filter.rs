//! Selecting which children of a group run.
//!
//! Selection happens independently at every group level, right before the
//! runner walks that level:
//!
//! 1. children tagged [`Tag::Excluded`] are dropped,
//! 2. if any remaining child is deep focused, only the deep focused ones
//!    stay, otherwise all remaining children stay.
//!
//! A child is deep focused when it is tagged [`Tag::Focused`] itself or is a
//! group with a focused descendant at any depth. Focus therefore narrows
//! every level on the way down to the focused element.

use crate::{
    element::{Element, Node, Tag},
    mode::CallMode,
};

/// The children of one group that take part in a run.
#[derive(Debug)]
pub struct Selection<'g, C: CallMode> {
    /// Selected children, in declaration order.
    pub nodes: Vec<&'g Node<C>>,

    /// How many children were left out.
    pub filtered_out: usize,
}

impl<C: CallMode> Selection<'_, C> {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Applies exclusion and focus to one level of siblings.
pub fn select<C: CallMode>(children: &[Node<C>]) -> Selection<'_, C> {
    let remaining: Vec<&Node<C>> = children
        .iter()
        .filter(|node| !node.has_tag(Tag::Excluded))
        .collect();

    let nodes: Vec<&Node<C>> = match remaining.iter().any(|node| node.is_deep_focused()) {
        true => remaining
            .into_iter()
            .filter(|node| node.is_deep_focused())
            .collect(),
        false => remaining,
    };

    Selection {
        filtered_out: children.len() - nodes.len(),
        nodes,
    }
}

impl<C: CallMode> Node<C> {
    /// Whether this node or anything below it is focused.
    pub fn is_deep_focused(&self) -> bool {
        if self.has_tag(Tag::Focused) {
            return true;
        }

        match self {
            Node::Group(group) => group.children().iter().any(Node::is_deep_focused),
            Node::Example(_) => false,
        }
    }
}
