//! Declarative construction of [`Group`] trees.
//!
//! A [`Builder`] records declarations in the order the declaration closure
//! makes them and checks every one against a small phase machine as it
//! arrives. The first rejected declaration is kept as the error, everything
//! declared after it is ignored, and [`Builder::finish`] returns that error
//! instead of a group.
//!
//! ```
//! use specwalk::prelude::*;
//!
//! let group = describe("Stack", |g| {
//!     g.before_each(|| Ok(()));
//!     g.it("starts empty", || Ok(()));
//!     g.describe("when pushed", |g| {
//!         g.it("is not empty", || Ok(())).focused();
//!     });
//!     g.after_all(|| Ok(()));
//! });
//! assert!(group.is_ok());
//! ```

use std::{borrow::Cow, future::Future, sync::Arc};

use futures::FutureExt;
use tracing::debug;

use crate::{
    element::{Example, Group, Hook, HookPhase, Node, Tag, Tags, WrapHook},
    error::{Outcome, StructureError},
    mode::{Async, AsyncNext, AsyncWrapFn, Blocking, BlockingWrapFn, CallMode, Next},
};

/// Where a declaration sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    BeforeAll,
    /// Before-each and around-each hooks share this phase.
    BeforeEach,
    Example,
    AfterEach,
    AfterAll,
}

/// The kind of one declaration, as seen by the phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declaration {
    BeforeAll,
    BeforeEach,
    AroundEach,
    Example,
    AfterEach,
    AfterAll,
}

impl From<HookPhase> for Declaration {
    fn from(phase: HookPhase) -> Self {
        match phase {
            HookPhase::BeforeAll => Self::BeforeAll,
            HookPhase::BeforeEach => Self::BeforeEach,
            HookPhase::AfterEach => Self::AfterEach,
            HookPhase::AfterAll => Self::AfterAll,
        }
    }
}

impl Phase {
    /// Phases a sequence may end in.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Example | Self::AfterEach | Self::AfterAll)
    }

    fn is_before(self) -> bool {
        matches!(self, Self::Start | Self::BeforeAll | Self::BeforeEach)
    }

    /// The phase after `next` is declared, or the rule it breaks.
    pub fn advance(self, next: Declaration) -> Result<Phase, StructureError> {
        use Declaration as D;
        use StructureError as E;

        match (self, next) {
            (Self::Start | Self::BeforeAll, D::BeforeAll) => Ok(Self::BeforeAll),
            (Self::BeforeEach, D::BeforeAll) => Err(E::BeforeAllAfterBeforeEach),
            (_, D::BeforeAll) => Err(E::BeforeAllAfterExamples),

            (before, D::BeforeEach | D::AroundEach) if before.is_before() => Ok(Self::BeforeEach),
            (_, D::BeforeEach) => Err(E::BeforeEachAfterExamples),
            (_, D::AroundEach) => Err(E::AroundEachAfterExamples),

            (before, D::Example) if before.is_before() => Ok(Self::Example),
            (Self::Example, D::Example) => Ok(Self::Example),
            (_, D::Example) => Err(E::ExampleAfterAfterHooks),

            (before, D::AfterEach | D::AfterAll) if before.is_before() => Err(E::MissingExamples),
            (Self::Example | Self::AfterEach, D::AfterEach) => Ok(Self::AfterEach),
            (_, D::AfterEach) => Err(E::AfterEachAfterAfterAll),
            (_, D::AfterAll) => Ok(Self::AfterAll),
        }
    }
}

/// Handle returned by every declaration, used to attach tags to it.
///
/// Declarations rejected by the phase machine hand out a detached handle,
/// tagging it has no effect.
#[derive(Debug)]
pub struct Declared<'a> {
    tags: Option<&'a mut Tags>,
}

impl<'a> Declared<'a> {
    fn attached(tags: &'a mut Tags) -> Self {
        Self { tags: Some(tags) }
    }

    fn detached() -> Self {
        Self { tags: None }
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        if let Some(tags) = self.tags.as_mut() {
            tags.insert(tag);
        }
        self
    }

    pub fn focused(self) -> Self {
        self.tag(Tag::Focused)
    }

    pub fn excluded(self) -> Self {
        self.tag(Tag::Excluded)
    }

    pub fn concurrent(self) -> Self {
        self.tag(Tag::Concurrent)
    }
}

/// Collects declarations for one group.
pub struct Builder<C: CallMode> {
    name: Cow<'static, str>,
    phase: Phase,
    error: Option<StructureError>,
    before_all: Vec<Hook<C>>,
    wrap: Vec<WrapHook<C>>,
    before_each: Vec<Hook<C>>,
    after_each: Vec<Hook<C>>,
    after_all: Vec<Hook<C>>,
    children: Vec<Node<C>>,
}

impl<C: CallMode> Builder<C> {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self::starting_at(name.into(), Phase::Start)
    }

    fn starting_at(name: Cow<'static, str>, phase: Phase) -> Self {
        Self {
            name,
            phase,
            error: None,
            before_all: Vec::new(),
            wrap: Vec::new(),
            before_each: Vec::new(),
            after_each: Vec::new(),
            after_all: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The first rejected declaration, if any.
    pub fn error(&self) -> Option<StructureError> {
        self.error
    }

    fn reject(&mut self, err: StructureError) {
        if self.error.is_none() {
            debug!(group = %self.name, %err, "rejected declaration");
            self.error = Some(err);
        }
    }

    fn declare(&mut self, next: Declaration) -> bool {
        if self.error.is_some() {
            return false;
        }

        match self.phase.advance(next) {
            Ok(phase) => {
                self.phase = phase;
                true
            }
            Err(err) => {
                self.reject(err);
                false
            }
        }
    }

    /// Declares a hook in the phase it carries.
    pub fn hook(&mut self, hook: Hook<C>) -> Declared<'_> {
        if !self.declare(hook.phase().into()) {
            return Declared::detached();
        }

        let list = match hook.phase() {
            HookPhase::BeforeAll => &mut self.before_all,
            HookPhase::BeforeEach => &mut self.before_each,
            HookPhase::AfterEach => &mut self.after_each,
            HookPhase::AfterAll => &mut self.after_all,
        };
        list.push(hook);
        match list.last_mut() {
            Some(hook) => Declared::attached(&mut hook.tags),
            None => Declared::detached(),
        }
    }

    pub fn wrap_hook(&mut self, hook: WrapHook<C>) -> Declared<'_> {
        if !self.declare(Declaration::AroundEach) {
            return Declared::detached();
        }

        self.wrap.push(hook);
        match self.wrap.last_mut() {
            Some(hook) => Declared::attached(&mut hook.tags),
            None => Declared::detached(),
        }
    }

    pub fn example(&mut self, example: Example<C>) -> Declared<'_> {
        if !self.declare(Declaration::Example) {
            return Declared::detached();
        }

        self.children.push(Node::Example(example));
        self.last_child_tags()
    }

    /// Adds an already built group as a child.
    pub fn group(&mut self, group: Group<C>) -> Declared<'_> {
        if !self.declare(Declaration::Example) {
            return Declared::detached();
        }

        self.children.push(Node::Group(Arc::new(group)));
        self.last_child_tags()
    }

    fn last_child_tags(&mut self) -> Declared<'_> {
        match self.children.last_mut() {
            Some(Node::Example(example)) => Declared::attached(&mut example.tags),
            Some(Node::Group(group)) => match Arc::get_mut(group) {
                Some(group) => Declared::attached(&mut group.tags),
                None => Declared::detached(),
            },
            None => Declared::detached(),
        }
    }

    /// Declares a nested group built by `body`.
    ///
    /// A structural error inside `body` becomes the error of this builder.
    pub fn describe(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        body: impl FnOnce(&mut Builder<C>),
    ) -> Declared<'_> {
        self.nested(name, None, body)
    }

    fn nested(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        within: Option<C::WrapCallback>,
        body: impl FnOnce(&mut Builder<C>),
    ) -> Declared<'_> {
        if !self.declare(Declaration::Example) {
            return Declared::detached();
        }

        let mut nested = Builder::new(name);
        body(&mut nested);
        match nested.finish() {
            Ok(group) => {
                let group = Group { within, ..group };
                self.children.push(Node::Group(Arc::new(group)));
                self.last_child_tags()
            }
            Err(err) => {
                self.reject(err);
                Declared::detached()
            }
        }
    }

    /// Same as [`describe`](Self::describe).
    pub fn context(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        body: impl FnOnce(&mut Builder<C>),
    ) -> Declared<'_> {
        self.describe(name, body)
    }

    fn fork(&self) -> Builder<C> {
        Builder::starting_at(self.name.clone(), self.phase)
    }

    fn absorb(&mut self, other: Builder<C>) {
        self.before_all.extend(other.before_all);
        self.wrap.extend(other.wrap);
        self.before_each.extend(other.before_each);
        self.after_each.extend(other.after_each);
        self.after_all.extend(other.after_all);
        self.children.extend(other.children);
    }

    /// Keeps the declarations of `body` only when `condition` holds.
    ///
    /// `body` is validated either way and must leave the phase where it found
    /// it, since skipping it leaves the phase unchanged. A conditional example
    /// therefore needs an unconditional one before it:
    ///
    /// ```
    /// use specwalk::prelude::*;
    ///
    /// let first = describe("Flags", |g| {
    ///     g.when(true, |g| {
    ///         g.it("only sometimes", || Ok(()));
    ///     });
    /// });
    /// assert_eq!(first.unwrap_err(), StructureError::MismatchedBranches);
    ///
    /// let after = describe("Flags", |g| {
    ///     g.it("always", || Ok(()));
    ///     g.when(true, |g| {
    ///         g.it("only sometimes", || Ok(()));
    ///     });
    /// });
    /// assert!(after.is_ok());
    /// ```
    pub fn when(&mut self, condition: bool, body: impl FnOnce(&mut Builder<C>)) {
        self.either(condition, body, |_| {});
    }

    /// Keeps the declarations of `then` when `condition` holds, otherwise
    /// those of `otherwise`. Both arms are validated and must end in the same
    /// phase.
    pub fn either(
        &mut self,
        condition: bool,
        then: impl FnOnce(&mut Builder<C>),
        otherwise: impl FnOnce(&mut Builder<C>),
    ) {
        if self.error.is_some() {
            return;
        }

        let mut first = self.fork();
        then(&mut first);
        let mut second = self.fork();
        otherwise(&mut second);

        if let Some(err) = first.error.or(second.error) {
            self.reject(err);
            return;
        }
        if first.phase != second.phase {
            self.reject(StructureError::MismatchedBranches);
            return;
        }

        self.phase = first.phase;
        self.absorb(if condition { first } else { second });
    }

    /// Runs `body` once per item. Each iteration is its own sequence and must
    /// end in an example or after hook; hooks it declares are appended once
    /// per iteration. The loop as a whole counts as an example.
    pub fn each<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        mut body: impl FnMut(&mut Builder<C>, T),
    ) {
        if !self.declare(Declaration::Example) {
            return;
        }

        for item in items {
            let mut iteration = Builder::starting_at(self.name.clone(), Phase::Start);
            body(&mut iteration, item);

            if let Some(err) = iteration.error {
                self.reject(err);
                return;
            }
            if !iteration.phase.is_final() {
                self.reject(StructureError::LoopEndsBeforeExamples);
                return;
            }
            self.absorb(iteration);
        }
    }

    /// Assembles the group, or returns the first rule the declarations broke.
    pub fn finish(self) -> Result<Group<C>, StructureError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        match self.phase {
            Phase::Start => return Err(StructureError::EmptyGroup),
            Phase::BeforeAll | Phase::BeforeEach => return Err(StructureError::MissingExamples),
            Phase::Example | Phase::AfterEach | Phase::AfterAll => {}
        }
        if self.children.is_empty() {
            return Err(StructureError::EmptyGroup);
        }

        Ok(Group {
            name: self.name,
            tags: Tags::new(),
            before_all: self.before_all,
            wrap: self.wrap,
            before_each: self.before_each,
            after_each: self.after_each,
            after_all: self.after_all,
            children: self.children,
            within: None,
        })
    }
}

impl Builder<Blocking> {
    /// Declares an example.
    pub fn it<F>(&mut self, name: impl Into<Cow<'static, str>>, f: F) -> Declared<'_>
    where
        F: Fn() -> Outcome + Send + Sync + 'static,
    {
        self.example(Example::<Blocking>::new(name, f))
    }

    pub fn before_all<F>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn() -> Outcome + Send + Sync + 'static,
    {
        self.hook(Hook::<Blocking>::new(HookPhase::BeforeAll, "", f))
    }

    pub fn before_each<F>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn() -> Outcome + Send + Sync + 'static,
    {
        self.hook(Hook::<Blocking>::new(HookPhase::BeforeEach, "", f))
    }

    pub fn after_each<F>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn() -> Outcome + Send + Sync + 'static,
    {
        self.hook(Hook::<Blocking>::new(HookPhase::AfterEach, "", f))
    }

    pub fn after_all<F>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn() -> Outcome + Send + Sync + 'static,
    {
        self.hook(Hook::<Blocking>::new(HookPhase::AfterAll, "", f))
    }

    /// Declares an around-each hook. It must call [`Next::run`] for the
    /// wrapped element to execute.
    pub fn around_each<F>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn(Next<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.wrap_hook(WrapHook::<Blocking>::new("", f))
    }

    /// Declares a nested group that runs entirely inside `f`, its hooks
    /// included. `f` must call [`Next::run`] for the group to execute; a
    /// skip returned before that skips the group.
    ///
    /// Counts as an example of this group.
    pub fn within<F>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        f: F,
        body: impl FnOnce(&mut Builder<Blocking>),
    ) -> Declared<'_>
    where
        F: Fn(Next<'_>) -> Outcome + Send + Sync + 'static,
    {
        let within: BlockingWrapFn = Arc::new(f);
        self.nested(name, Some(within), body)
    }
}

impl Builder<Async> {
    pub fn it<F, Fut>(&mut self, name: impl Into<Cow<'static, str>>, f: F) -> Declared<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        self.example(Example::<Async>::new(name, f))
    }

    pub fn before_all<F, Fut>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        self.hook(Hook::<Async>::new(HookPhase::BeforeAll, "", f))
    }

    pub fn before_each<F, Fut>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        self.hook(Hook::<Async>::new(HookPhase::BeforeEach, "", f))
    }

    pub fn after_each<F, Fut>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        self.hook(Hook::<Async>::new(HookPhase::AfterEach, "", f))
    }

    pub fn after_all<F, Fut>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        self.hook(Hook::<Async>::new(HookPhase::AfterAll, "", f))
    }

    /// Declares an around-each hook. It must await [`AsyncNext::run`] for
    /// the wrapped element to execute.
    pub fn around_each<F, Fut>(&mut self, f: F) -> Declared<'_>
    where
        F: Fn(AsyncNext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        self.wrap_hook(WrapHook::<Async>::new("", f))
    }

    /// Declares a nested group that runs entirely inside the future `f`
    /// returns, its hooks included. The group executes when that future
    /// awaits [`AsyncNext::run`].
    pub fn within<F, Fut>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        f: F,
        body: impl FnOnce(&mut Builder<Async>),
    ) -> Declared<'_>
    where
        F: Fn(AsyncNext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let within: AsyncWrapFn = Arc::new(move |next: AsyncNext| f(next).boxed());
        self.nested(name, Some(within), body)
    }
}

impl<C: CallMode> Group<C> {
    /// Builds a group named `name` from the declarations `body` makes.
    pub fn build(
        name: impl Into<Cow<'static, str>>,
        body: impl FnOnce(&mut Builder<C>),
    ) -> Result<Self, StructureError> {
        let mut builder = Builder::new(name);
        body(&mut builder);
        builder.finish()
    }
}

/// Builds a group of blocking callbacks.
pub fn describe(
    name: impl Into<Cow<'static, str>>,
    body: impl FnOnce(&mut Builder<Blocking>),
) -> Result<Group<Blocking>, StructureError> {
    Group::build(name, body)
}

/// Builds a group of async callbacks.
pub fn describe_async(
    name: impl Into<Cow<'static, str>>,
    body: impl FnOnce(&mut Builder<Async>),
) -> Result<Group<Async>, StructureError> {
    Group::build(name, body)
}
