//! Keeps every panel's entries in step with the shared property list.
//!
//! The synchronizer owns no form data. It reacts to host events, restores
//! "one entry per property, in property order" on every panel, stamps each
//! entry with its property's label and writes each panel's derived title.

mod debounce;
mod reorder;
mod title;

use std::{
    collections::{HashMap, HashSet},
    fmt,
    time::Instant,
};

use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

pub use debounce::Debounce;
pub use reorder::{Move, ReorderError, detect_move};
pub use title::{PanelFields, TitleContext, derive_title};

use crate::{
    error::SyncError,
    field::{FieldId, FormEvent, FormHost, Redraw, locate},
    html::{HtmlDecoder, TextContent},
    i18n::Localizer,
    options::SyncOptions,
    wait::{ChildWait, FieldScope, WaitStatus},
};

/// Payload-free pointer release broadcast by the host window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerRelease;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watch {
    Label,
    Title(FieldId),
}

#[derive(Debug, Clone)]
struct PendingWiring {
    image: FieldId,
    wait: ChildWait,
}

/// Collects the optional collaborators of a [`Synchronizer`] before it is
/// attached to a form.
pub struct SynchronizerBuilder {
    options: SyncOptions,
    localizer: Option<Box<dyn Localizer>>,
    decoder: Box<dyn HtmlDecoder>,
    pointer: Option<broadcast::Receiver<PointerRelease>>,
}

impl SynchronizerBuilder {
    /// Plain-text decoding, localization from `options.translations`, no
    /// pointer subscription.
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            localizer: None,
            decoder: Box::new(TextContent),
            pointer: None,
        }
    }

    /// Defaults to the translations carried by the options.
    pub fn localizer(mut self, localizer: impl Localizer + 'static) -> Self {
        self.localizer = Some(Box::new(localizer));
        self
    }

    /// Replaces the [`TextContent`] decoder used on entry text for titles.
    pub fn decoder(mut self, decoder: impl HtmlDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    /// Subscribe to the host's pointer releases. The subscription is dropped
    /// together with the synchronizer.
    pub fn pointer_signal(mut self, receiver: broadcast::Receiver<PointerRelease>) -> Self {
        self.pointer = Some(receiver);
        self
    }

    /// Locate the properties and panels lists under `root` and bring every
    /// panel in line with the properties.
    pub fn attach<H>(self, host: &mut H, root: FieldId, now: Instant) -> Result<Synchronizer, SyncError>
    where
        H: FormHost + ?Sized,
    {
        let SynchronizerBuilder {
            options,
            localizer,
            decoder,
            pointer,
        } = self;
        let properties = require_list(host, &options.paths.properties, root)?;
        let panels = require_list(host, &options.paths.panels, root)?;
        let localizer =
            localizer.unwrap_or_else(|| Box::new(options.translations.clone()));

        let mut sync = Synchronizer {
            reorder: Debounce::new(options.reorder_delay()),
            options,
            localizer,
            decoder,
            pointer,
            root,
            properties,
            panels,
            property_fields: Vec::new(),
            watches: HashMap::new(),
            pending: HashMap::new(),
            wired: HashSet::new(),
        };
        sync.initialize(host, now)?;
        Ok(sync)
    }
}

fn require_list<H>(host: &H, path: &str, root: FieldId) -> Result<FieldId, SyncError>
where
    H: FormHost + ?Sized,
{
    let list = locate(host, path, root).ok_or_else(|| SyncError::MissingField {
        path: path.to_string(),
    })?;
    if host.items(list).is_none() {
        return Err(SyncError::NotAList {
            path: path.to_string(),
        });
    }
    Ok(list)
}

/// Property ↔ entry synchronizer for one form instance.
pub struct Synchronizer {
    options: SyncOptions,
    localizer: Box<dyn Localizer>,
    decoder: Box<dyn HtmlDecoder>,
    pointer: Option<broadcast::Receiver<PointerRelease>>,
    root: FieldId,
    properties: FieldId,
    panels: FieldId,
    /// Label fields of the properties in the order the entries mirror.
    /// Kept up to date by add/remove events and compared against the host on
    /// a reorder check.
    property_fields: Vec<FieldId>,
    reorder: Debounce,
    watches: HashMap<FieldId, Watch>,
    pending: HashMap<FieldId, PendingWiring>,
    wired: HashSet<FieldId>,
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("root", &self.root)
            .field("properties", &self.properties)
            .field("panels", &self.panels)
            .field("property_fields", &self.property_fields)
            .field("reorder", &self.reorder)
            .field("watches", &self.watches.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    /// Shorthand for [`SynchronizerBuilder::new`].
    pub fn builder(options: SyncOptions) -> SynchronizerBuilder {
        SynchronizerBuilder::new(options)
    }

    pub fn root(&self) -> FieldId {
        self.root
    }

    pub fn properties(&self) -> FieldId {
        self.properties
    }

    pub fn panels(&self) -> FieldId {
        self.panels
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Whether change listeners for the panel's title sources are attached.
    pub fn is_wired(&self, panel: FieldId) -> bool {
        self.wired.contains(&panel)
    }

    /// Whether the panel is still waiting for its metadata form.
    pub fn is_waiting(&self, panel: FieldId) -> bool {
        self.pending.contains_key(&panel)
    }

    /// A pointer release was seen and the reorder check has not run yet.
    pub fn reorder_pending(&self) -> bool {
        self.reorder.is_pending()
    }

    /// Earliest instant at which [`Synchronizer::tick`] has work to do.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|pending| pending.wait.next_check())
            .chain(self.reorder.deadline())
            .min()
    }

    /// Forward validation of the wrapped form to the host.
    pub fn validate<H>(&self, host: &H) -> Result<(), Vec<String>>
    where
        H: FormHost + ?Sized,
    {
        host.validate(self.root)
    }

    /// Drain host events, handle them, then run [`Synchronizer::tick`].
    pub fn pump<H>(&mut self, host: &mut H, now: Instant) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        self.dispatch(host, now)?;
        self.tick(host, now)?;
        self.dispatch(host, now)
    }

    /// React to one host event. Events for other lists are ignored.
    pub fn handle<H>(&mut self, host: &mut H, event: &FormEvent, now: Instant) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        match *event {
            FormEvent::AddedItem { list, index, item } if list == self.properties => {
                self.on_property_added(host, index, item)
            }
            FormEvent::RemovedItem { list, index, item } if list == self.properties => {
                self.on_property_removed(host, index, item)
            }
            FormEvent::AddedItem { list, item, .. } if list == self.panels => {
                self.on_panel_added(host, item, now)
            }
            FormEvent::RemovedItem { list, item, .. } if list == self.panels => {
                self.on_panel_removed(item);
                Ok(())
            }
            FormEvent::Changed { field } => self.on_field_changed(host, field),
            FormEvent::PointerReleased => {
                self.pointer_released(now);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Re-arm the reorder check. The drag list settles slightly after the
    /// pointer is released, so detection runs once the burst has quiesced.
    pub fn pointer_released(&mut self, now: Instant) {
        self.reorder.trigger(now);
    }

    /// Run deferred work that is due: the reorder check and pending
    /// metadata-form waits.
    pub fn tick<H>(&mut self, host: &mut H, now: Instant) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        self.drain_pointer_signal(now);
        if self.reorder.fire(now) {
            self.apply_reorder(host)?;
        }
        self.poll_pending(host, now)
    }

    /// Title the panel would get from its current field values.
    pub fn panel_title<H>(&self, host: &H, panel: FieldId) -> String
    where
        H: FormHost + ?Sized,
    {
        let fields = self.panel_fields(host, panel);
        let ctx = self.title_context();
        derive_title(&fields, &ctx)
    }

    fn initialize<H>(&mut self, host: &mut H, now: Instant) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        self.property_fields = self.property_fields(host);
        for property in items(host, self.properties) {
            self.watch_label(host, property);
        }
        let panels = items(host, self.panels);
        for &panel in &panels {
            self.fill_up_entries(host, panel)?;
            self.begin_title_wiring(host, panel, now)?;
        }
        self.refresh_labels(host);
        self.refresh_titles(host)?;
        info!(
            properties = self.property_fields.len(),
            panels = panels.len(),
            "synchronizer attached"
        );
        Ok(())
    }

    fn dispatch<H>(&mut self, host: &mut H, now: Instant) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        loop {
            let events = host.drain_events();
            if events.is_empty() {
                return Ok(());
            }
            for event in &events {
                self.handle(host, event, now)?;
            }
        }
    }

    fn on_property_added<H>(
        &mut self,
        host: &mut H,
        index: usize,
        property: FieldId,
    ) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        self.settle_reorder(host, None)?;
        self.watch_label(host, property);

        let position = index.min(self.property_fields.len());
        let label = self.label_field(host, property);
        self.property_fields.insert(position, label);
        for panel in items(host, self.panels) {
            let Some(entries) = self.entries_of(host, panel) else {
                warn!(%panel, "panel has no entries list");
                continue;
            };
            let entry = host.add_item(entries)?;
            self.watch_entry(panel, entry);
            let last = items(host, entries).len().saturating_sub(1);
            if position < last {
                host.move_item(entries, last, position)?;
                host.redraw(entries, Redraw::Order);
            }
        }

        self.refresh_labels(host);
        self.refresh_titles(host)?;
        debug!(%property, position, properties = self.property_fields.len(), "property added");
        Ok(())
    }

    /// `index` is where the property sat in the host list just before it
    /// was removed. Entries are removed at the property's position in the
    /// order they currently mirror.
    fn on_property_removed<H>(
        &mut self,
        host: &mut H,
        index: usize,
        property: FieldId,
    ) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        let label = self.label_field(host, property);
        self.settle_reorder(host, Some((index, label)))?;
        self.watches.remove(&label);

        let position = match self.property_fields.iter().position(|&field| field == label) {
            Some(position) => {
                self.property_fields.remove(position);
                position
            }
            None => index,
        };
        for panel in items(host, self.panels) {
            let Some(entries) = self.entries_of(host, panel) else {
                warn!(%panel, "panel has no entries list");
                continue;
            };
            if position >= items(host, entries).len() {
                warn!(%panel, position, "panel has no entry for the removed property");
                continue;
            }
            let removed = host.remove_item(entries, position)?;
            self.watches.remove(&removed);
        }

        self.refresh_labels(host);
        self.refresh_titles(host)?;
        debug!(position, properties = self.property_fields.len(), "property removed");
        Ok(())
    }

    fn on_panel_added<H>(&mut self, host: &mut H, panel: FieldId, now: Instant) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        self.fill_up_entries(host, panel)?;
        self.begin_title_wiring(host, panel, now)?;
        self.refresh_labels(host);
        self.refresh_title(host, panel)?;
        debug!(%panel, "panel added");
        Ok(())
    }

    fn on_panel_removed(&mut self, panel: FieldId) {
        if self.pending.remove(&panel).is_some() {
            debug!(%panel, "cancelled metadata form wait for removed panel");
        }
        self.wired.remove(&panel);
        self.watches.retain(|_, watch| *watch != Watch::Title(panel));
    }

    fn on_field_changed<H>(&mut self, host: &mut H, field: FieldId) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        match self.watches.get(&field).copied() {
            Some(Watch::Label) => {
                self.refresh_labels(host);
                Ok(())
            }
            Some(Watch::Title(panel)) => self.refresh_title(host, panel),
            None => Ok(()),
        }
    }

    fn drain_pointer_signal(&mut self, now: Instant) {
        let Some(receiver) = self.pointer.as_mut() else {
            return;
        };
        let mut released = false;
        let mut closed = false;
        loop {
            match receiver.try_recv() {
                Ok(PointerRelease) | Err(TryRecvError::Lagged(_)) => released = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    closed = true;
                    break;
                }
            }
        }
        if closed {
            debug!("pointer signal closed");
            self.pointer = None;
        }
        if released {
            self.reorder.trigger(now);
        }
    }

    fn apply_reorder<H>(&mut self, host: &mut H) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        let current = self.property_fields(host);
        self.apply_order(host, current)
    }

    /// A drag still inside the reorder delay is applied before a structural
    /// edit, so entries are added or removed against the order the user sees.
    /// `removed` puts a just-removed property back at its index, giving the
    /// order as it was right before the removal.
    fn settle_reorder<H>(
        &mut self,
        host: &mut H,
        removed: Option<(usize, FieldId)>,
    ) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        if !self.reorder.is_pending() {
            return Ok(());
        }
        self.reorder.cancel();
        // Properties added later than the event being handled are not in the
        // snapshot yet.
        let mut order: Vec<FieldId> = self
            .property_fields(host)
            .into_iter()
            .filter(|field| self.property_fields.contains(field))
            .collect();
        if let Some((index, label)) = removed {
            order.insert(index.min(order.len()), label);
        }
        debug!("applying pending reorder before structural edit");
        self.apply_order(host, order)
    }

    fn apply_order<H>(&mut self, host: &mut H, current: Vec<FieldId>) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        let detected = detect_move(&self.property_fields, &current);
        self.property_fields = current;

        let moved = match detected {
            Ok(Some(moved)) => moved,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(%err, "skipping entry reorder");
                return Ok(());
            }
        };

        for panel in items(host, self.panels) {
            let Some(entries) = self.entries_of(host, panel) else {
                continue;
            };
            let len = items(host, entries).len();
            if moved.from >= len || moved.to >= len {
                warn!(%panel, len, "entries too short to apply property move");
                continue;
            }
            host.move_item(entries, moved.from, moved.to)?;
            host.redraw(entries, Redraw::Order);
        }
        self.refresh_labels(host);
        self.refresh_titles(host)?;
        debug!(from = moved.from, to = moved.to, "moved entries with their property");
        Ok(())
    }

    fn poll_pending<H>(&mut self, host: &mut H, now: Instant) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        let mut ready = Vec::new();
        let mut exhausted = Vec::new();
        for (&panel, pending) in self.pending.iter_mut() {
            match pending.wait.poll(&FieldScope::new(&*host, pending.image), now) {
                WaitStatus::Ready => ready.push(panel),
                WaitStatus::Exhausted => exhausted.push(panel),
                WaitStatus::Pending => {}
            }
        }

        for panel in exhausted {
            self.pending.remove(&panel);
            debug!(%panel, "metadata form never attached; title listeners skipped");
        }
        ready.sort();
        for panel in ready {
            self.pending.remove(&panel);
            self.wire_title_sources(host, panel)?;
        }
        Ok(())
    }

    fn fill_up_entries<H>(&mut self, host: &mut H, panel: FieldId) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        let Some(entries) = self.entries_of(host, panel) else {
            warn!(%panel, "panel has no entries list");
            return Ok(());
        };
        let target = items(host, self.properties).len();
        let present = items(host, entries).len();

        for _ in present..target {
            let entry = host.add_item(entries)?;
            self.watch_entry(panel, entry);
        }
        for index in (target..present).rev() {
            let removed = host.remove_item(entries, index)?;
            self.watches.remove(&removed);
        }
        if present != target {
            debug!(%panel, present, target, "resized entries to match properties");
        }
        Ok(())
    }

    fn begin_title_wiring<H>(&mut self, host: &mut H, panel: FieldId, now: Instant) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        let Some(image) = locate(host, self.options.paths.image.as_str(), panel) else {
            return self.wire_title_sources(host, panel);
        };
        let mut wait = ChildWait::new(
            self.options.paths.metadata_form.clone(),
            self.options.retry_policy(),
            now,
        );
        match wait.poll(&FieldScope::new(&*host, image), now) {
            WaitStatus::Ready => self.wire_title_sources(host, panel),
            WaitStatus::Pending => {
                self.pending.insert(panel, PendingWiring { image, wait });
                Ok(())
            }
            WaitStatus::Exhausted => {
                debug!(%panel, "metadata form not attached; title listeners skipped");
                Ok(())
            }
        }
    }

    fn wire_title_sources<H>(&mut self, host: &mut H, panel: FieldId) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        let paths = &self.options.paths;
        let mut sources: Vec<FieldId> = Vec::new();
        sources.extend(locate(host, paths.metadata_title.as_str(), panel));
        sources.extend(locate(host, paths.alt.as_str(), panel));
        if let Some(entries) = self.entries_of(host, panel) {
            sources.extend(items(host, entries));
        }

        for source in sources {
            self.watches.insert(source, Watch::Title(panel));
        }
        self.wired.insert(panel);
        debug!(%panel, "title sources wired");
        self.refresh_title(host, panel)
    }

    fn watch_label<H>(&mut self, host: &H, property: FieldId)
    where
        H: FormHost + ?Sized,
    {
        if let Some(label) = locate(host, self.options.paths.property_label.as_str(), property) {
            self.watches.insert(label, Watch::Label);
        }
    }

    fn watch_entry(&mut self, panel: FieldId, entry: FieldId) {
        if self.wired.contains(&panel) {
            self.watches.insert(entry, Watch::Title(panel));
        }
    }

    fn refresh_labels<H>(&self, host: &mut H)
    where
        H: FormHost + ?Sized,
    {
        let view: &H = host;
        let labels: Vec<Option<String>> = items(view, self.properties)
            .into_iter()
            .map(|property| {
                locate(view, self.options.paths.property_label.as_str(), property)
                    .and_then(|label| view.text(label))
            })
            .collect();

        for panel in items(host, self.panels) {
            let Some(entries) = self.entries_of(host, panel) else {
                continue;
            };
            for (index, entry) in items(host, entries).into_iter().enumerate() {
                host.set_caption(entry, labels.get(index).cloned().flatten());
            }
            host.redraw(entries, Redraw::Labels);
        }
    }

    fn refresh_titles<H>(&self, host: &mut H) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        for panel in items(host, self.panels) {
            self.refresh_title(host, panel)?;
        }
        Ok(())
    }

    /// Write the derived title into the panel's hidden title field. Only an
    /// actual change is written and signalled.
    fn refresh_title<H>(&self, host: &mut H, panel: FieldId) -> Result<(), SyncError>
    where
        H: FormHost + ?Sized,
    {
        let Some(field) = locate(host, self.options.paths.panel_title.as_str(), panel) else {
            return Ok(());
        };
        let title = self.panel_title(host, panel);
        if host.text(field).as_deref() == Some(title.as_str()) {
            return Ok(());
        }
        debug!(%panel, title = title.as_str(), "panel title updated");
        host.set_value(field, Value::String(title))?;
        host.signal_change(field);
        Ok(())
    }

    fn panel_fields<H>(&self, host: &H, panel: FieldId) -> PanelFields
    where
        H: FormHost + ?Sized,
    {
        let paths = &self.options.paths;
        let text_at = |path: &str| locate(host, path, panel).and_then(|field| host.text(field));
        PanelFields {
            metadata_title: text_at(&paths.metadata_title),
            alt: text_at(&paths.alt),
            entries: self
                .entries_of(host, panel)
                .map(|entries| {
                    items(host, entries)
                        .into_iter()
                        .map(|entry| host.text(entry).unwrap_or_default())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn title_context(&self) -> TitleContext<'_> {
        let untitled = |kind: &str| {
            let key = &self.options.untitled;
            self.localizer
                .translate(&key.namespace, &key.key, &[(key.variable.as_str(), kind)])
        };
        TitleContext {
            untitled_image: untitled(&self.options.image_kind),
            untitled_panel: untitled(&self.options.panel_kind),
            decoder: &*self.decoder,
        }
    }

    fn property_fields<H>(&self, host: &H) -> Vec<FieldId>
    where
        H: FormHost + ?Sized,
    {
        items(host, self.properties)
            .into_iter()
            .map(|property| self.label_field(host, property))
            .collect()
    }

    /// Stands in for its property in the order snapshot. Falls back to the
    /// property itself when it has no label field.
    fn label_field<H>(&self, host: &H, property: FieldId) -> FieldId
    where
        H: FormHost + ?Sized,
    {
        locate(host, self.options.paths.property_label.as_str(), property).unwrap_or(property)
    }

    fn entries_of<H>(&self, host: &H, panel: FieldId) -> Option<FieldId>
    where
        H: FormHost + ?Sized,
    {
        locate(host, self.options.paths.entries.as_str(), panel)
            .filter(|&entries| host.items(entries).is_some())
    }
}

fn items<H>(host: &H, list: FieldId) -> Vec<FieldId>
where
    H: FormHost + ?Sized,
{
    host.items(list).map(<[FieldId]>::to_vec).unwrap_or_default()
}
