//! The handler registry.
//!
//! Entries are partitioned by [`UpdateType`] and, inside a partition, by
//! group. Every group list stays sorted by `(priority, registration order)`;
//! lists are copy-on-write (`Arc<Vec<_>>`), so [`HandlerRegistry::entries_for`]
//! hands out a cheap snapshot that stays valid while the registry changes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tgbee_core::{TypeSet, UpdateType};
use tracing::{debug, trace};

use crate::context::HandlerContext;
use crate::error::{BoxError, InvalidHandlerError};
use crate::filter::Filter;
use crate::handler::{BoxedHandler, Handler, HandlerService, boxed};

/// Mutual-exclusion partition of handlers. The first match in a group wins.
pub type GroupId = i32;

/// Lower runs first.
pub type Priority = i32;

/// Opaque handle returned by [`HandlerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerHandle(u64);

impl fmt::Display for HandlerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The order in which the groups of one update are walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrder {
    /// By numeric group id.
    #[default]
    Ascending,
    /// By the time each group received its first entry.
    Registration,
}

// ============================================================================
// Registration
// ============================================================================

/// A pending registry entry.
///
/// ```rust,ignore
/// registry.register(
///     Registration::new(filter::command(["start"]) & filter::private(), start)
///         .priority(-1)
///         .group(1),
/// )?;
/// ```
pub struct Registration {
    filter: Filter,
    service: BoxedHandler,
    accepts: TypeSet,
    priority: Priority,
    group: Option<GroupId>,
    name: Option<String>,
}

impl Registration {
    /// Registers a handler function. The default name is the function name.
    pub fn new<H, T>(filter: impl Into<Filter>, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        let name = short_type_name::<H>();
        Self {
            filter: filter.into(),
            service: boxed(HandlerService::new(handler)),
            accepts: H::accepted_types(),
            priority: 0,
            group: None,
            name: Some(name.to_string()),
        }
    }

    /// Registers an arbitrary tower service, typically a handler with layers
    /// stacked on top. `accepts` plays the role of the extractor types.
    pub fn service<S>(filter: impl Into<Filter>, service: S, accepts: TypeSet) -> Self
    where
        S: tower::Service<Arc<HandlerContext>, Response = (), Error = BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            filter: filter.into(),
            service: boxed(service),
            accepts,
            priority: 0,
            group: None,
            name: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn handler_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The group the entry will land in.
    pub fn group_id(&self) -> GroupId {
        self.group.unwrap_or(0)
    }

    /// Applies a group unless one was set explicitly.
    pub(crate) fn default_group(mut self, group: Option<GroupId>) -> Self {
        if self.group.is_none() {
            self.group = group;
        }
        self
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .field("priority", &self.priority)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

// ============================================================================
// HandlerEntry
// ============================================================================

/// A registered (filter, handler, priority, group) tuple.
pub struct HandlerEntry {
    handle: HandlerHandle,
    name: Arc<str>,
    filter: Filter,
    service: BoxedHandler,
    priority: Priority,
    group: GroupId,
    types: TypeSet,
}

impl HandlerEntry {
    pub fn handle(&self) -> HandlerHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Update variants this entry is filed under.
    pub fn types(&self) -> TypeSet {
        self.types
    }

    pub(crate) fn service(&self) -> BoxedHandler {
        self.service.clone()
    }

    fn sort_key(&self) -> (Priority, HandlerHandle) {
        (self.priority, self.handle)
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("filter", &self.filter)
            .field("priority", &self.priority)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

type GroupList = Arc<Vec<Arc<HandlerEntry>>>;

// ============================================================================
// EntriesFor
// ============================================================================

/// Snapshot of the entries applicable to one update variant.
///
/// Iteration is lazy and can be restarted any number of times; later registry
/// changes do not affect an existing snapshot.
#[derive(Debug, Clone)]
pub struct EntriesFor {
    update_type: UpdateType,
    groups: Vec<(GroupId, GroupList)>,
}

impl EntriesFor {
    pub fn update_type(&self) -> UpdateType {
        self.update_type
    }

    /// All entries, group by group in walk order, each group sorted by
    /// `(priority, registration order)`.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<HandlerEntry>> + '_ {
        self.groups.iter().flat_map(|(_, list)| list.iter())
    }

    /// Groups in walk order.
    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &[Arc<HandlerEntry>])> + '_ {
        self.groups.iter().map(|(g, list)| (*g, list.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, list)| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<'a> IntoIterator for &'a EntriesFor {
    type Item = &'a Arc<HandlerEntry>;
    type IntoIter = Box<dyn Iterator<Item = &'a Arc<HandlerEntry>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

// ============================================================================
// HandlerRegistry
// ============================================================================

/// Ordered handler entries, partitioned by update variant.
#[derive(Default)]
pub struct HandlerRegistry {
    partitions: HashMap<UpdateType, BTreeMap<GroupId, GroupList>>,
    entries: HashMap<HandlerHandle, Arc<HandlerEntry>>,
    /// First handle each group ever received, for [`GroupOrder::Registration`].
    group_seen: HashMap<GroupId, HandlerHandle>,
    next_handle: u64,
    group_order: GroupOrder,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_order(order: GroupOrder) -> Self {
        Self {
            group_order: order,
            ..Self::default()
        }
    }

    pub fn group_order(&self) -> GroupOrder {
        self.group_order
    }

    pub fn set_group_order(&mut self, order: GroupOrder) {
        self.group_order = order;
    }

    /// Adds an entry.
    ///
    /// The entry is filed under every variant both its filter and its
    /// handler's extractors accept; an empty intersection is rejected.
    pub fn register(
        &mut self,
        registration: Registration,
    ) -> Result<HandlerHandle, InvalidHandlerError> {
        let Registration {
            filter,
            service,
            accepts,
            priority,
            group,
            name,
        } = registration;

        let name = match name {
            Some(n) if !n.trim().is_empty() => n,
            Some(_) => return Err(InvalidHandlerError::EmptyName),
            None => format!("handler-{}", self.next_handle),
        };

        let filter_types = filter.applicable_types();
        if filter_types.is_empty() {
            return Err(InvalidHandlerError::NeverMatches {
                handler: name,
                filter: filter.to_string(),
            });
        }
        let types = filter_types & accepts;
        if types.is_empty() {
            return Err(InvalidHandlerError::IncompatibleTypes {
                handler: name,
                accepts,
                filter_types,
            });
        }

        let handle = HandlerHandle(self.next_handle);
        self.next_handle += 1;
        let group = group.unwrap_or(0);
        self.group_seen.entry(group).or_insert(handle);

        let entry = Arc::new(HandlerEntry {
            handle,
            name: Arc::from(name),
            filter,
            service,
            priority,
            group,
            types,
        });

        for ty in types.iter() {
            let list = self
                .partitions
                .entry(ty)
                .or_default()
                .entry(group)
                .or_default();
            let list = Arc::make_mut(list);
            let key = entry.sort_key();
            let pos = list.partition_point(|e| e.sort_key() <= key);
            list.insert(pos, Arc::clone(&entry));
        }

        debug!(
            handler = %entry.name,
            handle = %handle,
            group,
            priority,
            filter = %entry.filter,
            "registered handler"
        );
        self.entries.insert(handle, entry);
        Ok(handle)
    }

    /// Registers a handler function with priority 0 in group 0.
    pub fn register_fn<H, T>(
        &mut self,
        filter: impl Into<Filter>,
        handler: H,
    ) -> Result<HandlerHandle, InvalidHandlerError>
    where
        H: Handler<T>,
        T: 'static,
    {
        self.register(Registration::new(filter, handler))
    }

    /// Removes an entry. Returns `false` when it was already gone.
    pub fn unregister(&mut self, handle: HandlerHandle) -> bool {
        let Some(entry) = self.entries.remove(&handle) else {
            trace!(handle = %handle, "unregister of unknown handle ignored");
            return false;
        };
        for ty in entry.types.iter() {
            if let Some(groups) = self.partitions.get_mut(&ty) {
                if let Some(list) = groups.get_mut(&entry.group) {
                    Arc::make_mut(list).retain(|e| e.handle != handle);
                    if list.is_empty() {
                        groups.remove(&entry.group);
                    }
                }
                if groups.is_empty() {
                    self.partitions.remove(&ty);
                }
            }
        }
        debug!(handler = %entry.name, handle = %handle, "unregistered handler");
        true
    }

    /// Removes every entry of a group and returns their handles.
    ///
    /// The group keeps its place under [`GroupOrder::Registration`].
    pub fn clear_group(&mut self, group: GroupId) -> Vec<HandlerHandle> {
        let mut removed: Vec<HandlerHandle> = self
            .entries
            .values()
            .filter(|e| e.group == group)
            .map(|e| e.handle)
            .collect();
        removed.sort();
        for &handle in &removed {
            self.entries.remove(&handle);
        }
        self.partitions.retain(|_, groups| {
            groups.remove(&group);
            !groups.is_empty()
        });
        debug!(group, removed = removed.len(), "cleared handler group");
        removed
    }

    /// Snapshot of the entries applicable to `update_type`, in walk order.
    pub fn entries_for(&self, update_type: UpdateType) -> EntriesFor {
        let mut groups: Vec<(GroupId, GroupList)> = self
            .partitions
            .get(&update_type)
            .map(|groups| groups.iter().map(|(g, l)| (*g, Arc::clone(l))).collect())
            .unwrap_or_default();
        if self.group_order == GroupOrder::Registration {
            groups.sort_by_key(|(g, _)| self.group_seen.get(g).copied());
        }
        EntriesFor {
            update_type,
            groups,
        }
    }

    pub fn get(&self, handle: HandlerHandle) -> Option<&Arc<HandlerEntry>> {
        self.entries.get(&handle)
    }

    pub fn contains(&self, handle: HandlerHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Groups that currently hold at least one entry, ascending.
    pub fn groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self.entries.values().map(|e| e.group).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("len", &self.entries.len())
            .field("groups", &self.groups())
            .field("group_order", &self.group_order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter;
    use tgbee_core::{CallbackQuery, Message};

    async fn noop() {}
    async fn on_message(_m: Message) {}
    async fn on_callback(_q: CallbackQuery) {}

    fn names(entries: &EntriesFor) -> Vec<&str> {
        entries.iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_sorted_by_priority_then_registration() {
        let mut reg = HandlerRegistry::new();
        for (name, priority) in [("c", 5), ("a", 0), ("d", 5), ("b", 1), ("z", -3)] {
            reg.register(Registration::new(filter::text(), noop).priority(priority).name(name))
                .unwrap();
        }
        let entries = reg.entries_for(UpdateType::Message);
        assert_eq!(names(&entries), vec!["z", "a", "b", "c", "d"]);
        // restartable
        assert_eq!(entries.iter().count(), entries.iter().count());
        assert!(reg.entries_for(UpdateType::CallbackQuery).is_empty());
    }

    #[test]
    fn test_partitioned_by_variant() {
        let mut reg = HandlerRegistry::new();
        reg.register_fn(Filter::always(), on_message).unwrap();
        reg.register_fn(Filter::always(), on_callback).unwrap();
        reg.register_fn(Filter::always(), noop).unwrap();

        assert_eq!(reg.entries_for(UpdateType::Message).len(), 2);
        assert_eq!(reg.entries_for(UpdateType::EditedChannelPost).len(), 2);
        assert_eq!(reg.entries_for(UpdateType::CallbackQuery).len(), 2);
        assert_eq!(reg.entries_for(UpdateType::PollAnswer).len(), 1);
        assert_eq!(
            reg.get(HandlerHandle(0)).map(|e| e.name()),
            Some("on_message")
        );
    }

    #[test]
    fn test_rejections() {
        let mut reg = HandlerRegistry::new();
        assert!(matches!(
            reg.register_fn(Filter::never(), noop),
            Err(InvalidHandlerError::NeverMatches { .. })
        ));
        assert!(matches!(
            reg.register_fn(filter::callback_data(), on_message),
            Err(InvalidHandlerError::IncompatibleTypes { .. })
        ));
        assert_eq!(
            reg.register(Registration::new(filter::text(), noop).name("  ")),
            Err(InvalidHandlerError::EmptyName)
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent_and_snapshots_survive() {
        let mut reg = HandlerRegistry::new();
        let a = reg.register_fn(filter::text(), noop).unwrap();
        let b = reg.register_fn(filter::text(), on_message).unwrap();
        let before = reg.entries_for(UpdateType::Message);

        assert!(reg.unregister(a));
        assert!(!reg.unregister(a));
        assert!(!reg.contains(a));
        assert!(reg.contains(b));

        assert_eq!(before.len(), 2);
        assert_eq!(reg.entries_for(UpdateType::Message).len(), 1);
    }

    #[test]
    fn test_clear_group() {
        let mut reg = HandlerRegistry::new();
        let a = reg.register(Registration::new(filter::text(), noop).group(1)).unwrap();
        reg.register(Registration::new(filter::text(), noop).group(2)).unwrap();
        let c = reg.register(Registration::new(filter::poll(), noop).group(1)).unwrap();

        assert_eq!(reg.clear_group(1), vec![a, c]);
        assert_eq!(reg.groups(), vec![2]);
        assert!(reg.entries_for(UpdateType::Poll).is_empty());
        assert!(reg.clear_group(1).is_empty());
    }

    #[test]
    fn test_group_order() {
        let mut reg = HandlerRegistry::new();
        reg.register(Registration::new(filter::text(), noop).group(3).name("g3")).unwrap();
        reg.register(Registration::new(filter::text(), noop).group(-1).name("g-1")).unwrap();
        reg.register(Registration::new(filter::text(), noop).group(0).name("g0")).unwrap();

        assert_eq!(names(&reg.entries_for(UpdateType::Message)), vec!["g-1", "g0", "g3"]);

        reg.set_group_order(GroupOrder::Registration);
        assert_eq!(names(&reg.entries_for(UpdateType::Message)), vec!["g3", "g-1", "g0"]);
    }
}
