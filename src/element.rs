//! The nodes a test tree is made of.
//!
//! A [`Group`] owns its hooks and an ordered list of children, each either a
//! nested group or an [`Example`]. Groups are produced by the
//! [`Builder`](crate::builder::Builder) and never change afterwards.

use std::{
    borrow::Cow,
    collections::BTreeSet,
    fmt::{self, Debug, Display},
    future::Future,
    sync::Arc,
};

use futures::FutureExt;

use crate::{
    error::Outcome,
    mode::{Async, AsyncNext, Blocking, CallMode, Next},
};

/// Markers that change how the runner treats an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Tag {
    /// Narrow the containing group to focused branches.
    ///
    /// Focus propagates upwards: a group with a focused descendant counts as
    /// focused for its own siblings. Meant as a temporary debugging aid.
    Focused,

    /// Remove the element from the run. A group whose children are all
    /// excluded does not run its hooks either.
    Excluded,

    /// Run the children of a group concurrently.
    Concurrent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(BTreeSet<Tag>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: Tag) {
        self.0.insert(tag);
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.0.contains(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = Tag> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What every node of the tree exposes.
pub trait Element {
    /// Human readable text for this element, one segment of a full description.
    fn description(&self) -> Cow<'_, str>;

    fn tags(&self) -> &Tags;

    fn has_tag(&self, tag: Tag) -> bool {
        self.tags().contains(tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    BeforeAll,
    BeforeEach,
    AfterEach,
    AfterAll,
}

impl HookPhase {
    pub fn name(self) -> &'static str {
        match self {
            Self::BeforeAll => "before all",
            Self::BeforeEach => "before each",
            Self::AfterEach => "after each",
            Self::AfterAll => "after all",
        }
    }
}

impl Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn hook_description<'a>(phase: &'static str, name: &'a str) -> Cow<'a, str> {
    match name.is_empty() {
        true => Cow::Borrowed(phase),
        false => Cow::Owned(format!("{phase}: {name}")),
    }
}

/// A setup or teardown callback bound to one [`HookPhase`].
pub struct Hook<C: CallMode> {
    phase: HookPhase,
    name: Cow<'static, str>,
    pub(crate) tags: Tags,
    pub(crate) callback: C::Callback,
}

impl<C: CallMode> Hook<C> {
    pub fn phase(&self) -> HookPhase {
        self.phase
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }
}

impl Hook<Blocking> {
    pub fn new<F>(phase: HookPhase, name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn() -> Outcome + Send + Sync + 'static,
    {
        Self {
            phase,
            name: name.into(),
            tags: Tags::new(),
            callback: Arc::new(f),
        }
    }
}

impl Hook<Async> {
    pub fn new<F, Fut>(phase: HookPhase, name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            phase,
            name: name.into(),
            tags: Tags::new(),
            callback: Arc::new(move || f().boxed()),
        }
    }
}

impl<C: CallMode> Element for Hook<C> {
    fn description(&self) -> Cow<'_, str> {
        hook_description(self.phase.name(), &self.name)
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl<C: CallMode> Clone for Hook<C> {
    fn clone(&self) -> Self {
        Self {
            phase: self.phase,
            name: self.name.clone(),
            tags: self.tags.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<C: CallMode> Debug for Hook<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("phase", &self.phase)
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// An around-each hook: receives the rest of the element's execution as a
/// continuation and decides when (and whether) to run it.
pub struct WrapHook<C: CallMode> {
    name: Cow<'static, str>,
    pub(crate) tags: Tags,
    pub(crate) callback: C::WrapCallback,
}

impl<C: CallMode> WrapHook<C> {
    pub const PHASE_NAME: &'static str = "around each";

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }
}

impl WrapHook<Blocking> {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Next<'_>) -> Outcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            tags: Tags::new(),
            callback: Arc::new(f),
        }
    }
}

impl WrapHook<Async> {
    pub fn new<F, Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(AsyncNext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            name: name.into(),
            tags: Tags::new(),
            callback: Arc::new(move |next: AsyncNext| f(next).boxed()),
        }
    }
}

impl<C: CallMode> Element for WrapHook<C> {
    fn description(&self) -> Cow<'_, str> {
        hook_description(Self::PHASE_NAME, &self.name)
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl<C: CallMode> Clone for WrapHook<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tags: self.tags.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<C: CallMode> Debug for WrapHook<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapHook")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// A single test case.
pub struct Example<C: CallMode> {
    name: Cow<'static, str>,
    pub(crate) tags: Tags,
    pub(crate) callback: C::Callback,
}

impl<C: CallMode> Example<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }
}

impl Example<Blocking> {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn() -> Outcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            tags: Tags::new(),
            callback: Arc::new(f),
        }
    }
}

impl Example<Async> {
    pub fn new<F, Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            name: name.into(),
            tags: Tags::new(),
            callback: Arc::new(move || f().boxed()),
        }
    }
}

impl<C: CallMode> Element for Example<C> {
    fn description(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl<C: CallMode> Clone for Example<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tags: self.tags.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<C: CallMode> Debug for Example<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Example")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// A child of a [`Group`].
pub enum Node<C: CallMode> {
    Group(Arc<Group<C>>),
    Example(Example<C>),
}

impl<C: CallMode> Element for Node<C> {
    fn description(&self) -> Cow<'_, str> {
        match self {
            Self::Group(group) => group.description(),
            Self::Example(example) => example.description(),
        }
    }

    fn tags(&self) -> &Tags {
        match self {
            Self::Group(group) => group.tags(),
            Self::Example(example) => example.tags(),
        }
    }
}

impl<C: CallMode> Clone for Node<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Group(group) => Self::Group(Arc::clone(group)),
            Self::Example(example) => Self::Example(example.clone()),
        }
    }
}

impl<C: CallMode> Debug for Node<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(group) => Debug::fmt(group, f),
            Self::Example(example) => Debug::fmt(example, f),
        }
    }
}

/// A named node owning hooks and children.
pub struct Group<C: CallMode> {
    pub(crate) name: Cow<'static, str>,
    pub(crate) tags: Tags,
    pub(crate) before_all: Vec<Hook<C>>,
    pub(crate) wrap: Vec<WrapHook<C>>,
    pub(crate) before_each: Vec<Hook<C>>,
    pub(crate) after_each: Vec<Hook<C>>,
    pub(crate) after_all: Vec<Hook<C>>,
    pub(crate) children: Vec<Node<C>>,
    /// Runs the whole group, hooks included, inside a user callback.
    pub(crate) within: Option<C::WrapCallback>,
}

impl<C: CallMode> Group<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn before_all(&self) -> &[Hook<C>] {
        &self.before_all
    }

    pub fn wrap_hooks(&self) -> &[WrapHook<C>] {
        &self.wrap
    }

    pub fn before_each(&self) -> &[Hook<C>] {
        &self.before_each
    }

    pub fn after_each(&self) -> &[Hook<C>] {
        &self.after_each
    }

    pub fn after_all(&self) -> &[Hook<C>] {
        &self.after_all
    }

    pub fn children(&self) -> &[Node<C>] {
        &self.children
    }

    /// Whether the group runs inside a callback, see
    /// [`Builder::within`](crate::builder::Builder::within).
    pub fn is_within(&self) -> bool {
        self.within.is_some()
    }

    /// Returns the group under a different name.
    pub fn named(self, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }
}

impl<C: CallMode> Element for Group<C> {
    fn description(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl<C: CallMode> Clone for Group<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tags: self.tags.clone(),
            before_all: self.before_all.clone(),
            wrap: self.wrap.clone(),
            before_each: self.before_each.clone(),
            after_each: self.after_each.clone(),
            after_all: self.after_all.clone(),
            children: self.children.clone(),
            within: self.within.clone(),
        }
    }
}

impl<C: CallMode> Debug for Group<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("before_all", &self.before_all)
            .field("wrap", &self.wrap)
            .field("before_each", &self.before_each)
            .field("after_each", &self.after_each)
            .field("after_all", &self.after_all)
            .field("children", &self.children)
            .field("within", &self.within.is_some())
            .finish()
    }
}
