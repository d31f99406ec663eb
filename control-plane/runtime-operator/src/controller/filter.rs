use kube::Resource;
use kube::runtime::watcher;

/// A cluster change notification for a watched object.
#[derive(Debug)]
pub enum Notification<'a, K> {
    Create(&'a K),
    Update { old: Option<&'a K>, new: &'a K },
    Delete(&'a K),
}

/// Decide whether a notification should enqueue a reconcile pass.
///
/// Deletes never do: teardown belongs to the finalizer path. Updates are
/// dropped once the new object carries a deletion timestamp.
pub fn should_reconcile<K: Resource>(n: &Notification<'_, K>) -> bool {
    match n {
        Notification::Create(_) => true,
        Notification::Update { new, .. } => !is_deleting(*new),
        Notification::Delete(_) => false,
    }
}

fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Apply [`should_reconcile`] to raw watcher events.
///
/// Objects listed while the watch (re)starts are first sightings for this
/// process and count as creates, so one already marked for deletion is
/// still scheduled once. Later applies carry no previous version and are
/// judged as updates. Relist bookkeeping events pass through untouched.
pub fn admits<K: Resource>(event: &watcher::Event<K>) -> bool {
    match event {
        watcher::Event::InitApply(obj) => should_reconcile(&Notification::Create(obj)),
        watcher::Event::Apply(obj) => should_reconcile(&Notification::Update {
            old: None,
            new: obj,
        }),
        watcher::Event::Delete(obj) => should_reconcile(&Notification::Delete(obj)),
        watcher::Event::Init | watcher::Event::InitDone => true,
    }
}
