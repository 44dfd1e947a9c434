//! Page driver: DOM events, the mutation feed and the render engine wired to
//! one [`Session`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use gloo_events::{EventListener, EventListenerOptions, EventListenerPhase};
use gloo_timers::future::TimeoutFuture;
use scribe_core::config::{PreferenceSource, Preferences, ScribeConfig};
use scribe_core::controller::{InputKind, Scope};
use scribe_core::correction::{Issue, IssueId};
use scribe_core::mutation::ApplyOutcome;
use scribe_core::render::{Activated, Activation, ApplyRequest, HitTarget, Point, RenderEngine, Strategy};
use scribe_core::service::{LanguageDetector, ProofreaderFactory};
use scribe_core::session::Session;
use scribe_core::shortcut::{Key, Modifiers};
use scribe_core::store::IssueUpdate;
use scribe_core::subscription::{Emitter, Subscription, SubscriptionSet};
use scribe_core::tracker::SurfaceNode;
use scribe_core::types::SurfaceId;
use scribe_core::{EditableSurface, Instant, Result, ScribeError};
use wasm_bindgen::JsCast;

use crate::PlatformError;
use crate::factory::DomHighlighterFactory;
use crate::feed::MutationFeed;
use crate::node::{DomDocument, DomNode, event_node};
use crate::platform::platform;
use crate::surface::DomSurface;

type Lookup = Box<dyn Fn(SurfaceId) -> Option<web_sys::HtmlElement>>;

/// Live proofreading for one document.
pub struct BrowserScribe<F: ProofreaderFactory + 'static, D: LanguageDetector + 'static> {
    document: DomDocument,
    session: Rc<Session<DomNode, F, D>>,
    engine: RefCell<RenderEngine<DomHighlighterFactory<Lookup>>>,
    feed: RefCell<Option<MutationFeed>>,
    attached: RefCell<BTreeSet<SurfaceId>>,
    listeners: RefCell<Vec<EventListener>>,
    subscriptions: RefCell<SubscriptionSet>,
    selected: Emitter<Issue>,
    pumping: Cell<bool>,
}

impl<F, D> BrowserScribe<F, D>
where
    F: ProofreaderFactory + 'static,
    D: LanguageDetector + 'static,
{
    /// Start proofreading the current document.
    pub fn start<P: PreferenceSource>(
        config: ScribeConfig,
        preferences: &P,
        factory: F,
        detector: D,
    ) -> Result<Rc<Self>> {
        let document = DomDocument::current()?;
        let root = document.root()?;

        let session = Rc::new(Session::<DomNode, F, D>::new(config.clone(), factory, detector));
        session.bind_preferences(preferences);

        let weak_session = Rc::downgrade(&session);
        let lookup: Lookup = Box::new(move |surface| {
            let (node, _) = weak_session.upgrade()?.node(surface)?;
            node.html_element()
        });
        let engine = RenderEngine::new(
            DomHighlighterFactory::new(document.document(), lookup),
            config.overlay,
            &preferences.snapshot(),
        );

        let this = Rc::new(Self {
            document: document.clone(),
            session,
            engine: RefCell::new(engine),
            feed: RefCell::new(None),
            attached: RefCell::new(BTreeSet::new()),
            listeners: RefCell::new(Vec::new()),
            subscriptions: RefCell::new(SubscriptionSet::new()),
            selected: Emitter::new(),
            pumping: Cell::new(false),
        });

        this.subscribe(preferences);
        this.session.track(&root);
        this.reconcile_overlays();

        let weak = Rc::downgrade(&this);
        let feed = MutationFeed::observe(&document, &root, move || {
            if let Some(this) = weak.upgrade() {
                this.sync();
            }
        })?;
        *this.feed.borrow_mut() = Some(feed);

        this.listen()?;
        tracing::info!(
            target: "scribe::browser",
            surfaces = this.session.surfaces().len(),
            "proofreading started"
        );
        Ok(this)
    }

    pub fn session(&self) -> &Session<DomNode, F, D> {
        &self.session
    }

    /// Issues the user clicked on.
    pub fn subscribe_selection(&self, listener: impl FnMut(&Issue) + 'static) -> Subscription {
        self.selected.subscribe(listener)
    }

    fn subscribe<P: PreferenceSource>(self: &Rc<Self>, preferences: &P) {
        let weak = Rc::downgrade(self);
        let updates = self.session.subscribe_updates(move |update: &IssueUpdate| {
            if let Some(this) = weak.upgrade() {
                this.render_update(update);
            }
        });

        let weak = Rc::downgrade(self);
        let prefs = preferences.subscribe(Box::new(move |prefs: &Preferences| {
            let Some(this) = weak.upgrade() else {
                return;
            };
            match this.engine.try_borrow_mut() {
                Ok(mut engine) => engine.set_preferences(prefs),
                Err(_) => {
                    tracing::warn!(target: "scribe::browser", "preference change during render, ignored")
                }
            }
        }));

        // Applying mutates the surface, which re-enters the engine through the
        // update listener; defer it out of the activation.
        let weak = Rc::downgrade(self);
        let apply = self.engine.borrow().on_apply(move |request: &ApplyRequest| {
            let weak = weak.clone();
            let request = request.clone();
            wasm_bindgen_futures::spawn_local(async move {
                if let Some(this) = weak.upgrade() {
                    if let Err(e) = this.apply(request.surface, &request.issue) {
                        tracing::warn!(target: "scribe::browser", surface = %request.surface, error = %e, "apply failed");
                    }
                }
            });
        });

        let mut subscriptions = self.subscriptions.borrow_mut();
        subscriptions.push(updates);
        subscriptions.push(prefs);
        subscriptions.push(apply);
    }

    fn render_update(&self, update: &IssueUpdate) {
        let Ok(mut engine) = self.engine.try_borrow_mut() else {
            tracing::warn!(target: "scribe::browser", "issue update during render, skipped");
            return;
        };
        let session = &self.session;
        engine.apply_update(update, |surface| {
            session.node(surface).map(|(node, _)| node.current_text())
        });
    }

    /// Re-render one surface from the session's current issues.
    fn redraw(&self, surface: SurfaceId) {
        let Some((node, _)) = self.session.node(surface) else {
            return;
        };
        let issues = self.session.issues(surface);
        if let Ok(mut engine) = self.engine.try_borrow_mut() {
            engine.render(surface, &node.current_text(), &issues);
        }
    }

    /// Attach highlighters to new surfaces and drop those of removed ones.
    fn reconcile_overlays(&self) {
        let current: BTreeSet<SurfaceId> = self.session.surfaces().into_iter().collect();
        let mut attached = self.attached.borrow_mut();
        let gone: Vec<SurfaceId> = attached.difference(&current).copied().collect();
        let added: Vec<SurfaceId> = current.difference(&attached).copied().collect();
        {
            let mut engine = self.engine.borrow_mut();
            for surface in gone {
                engine.detach(surface);
                attached.remove(&surface);
            }
            for &surface in &added {
                let Some((_, kind)) = self.session.node(surface) else {
                    continue;
                };
                // A failed construction is logged by the engine and leaves the
                // surface undecorated.
                let _ = engine.attach(surface, kind);
                attached.insert(surface);
            }
        }
        drop(attached);
        for surface in added {
            self.redraw(surface);
        }
    }

    fn sync(&self) {
        {
            let mut feed = self.feed.borrow_mut();
            let Some(feed) = feed.as_mut() else {
                return;
            };
            self.session.sync(feed);
        }
        self.reconcile_overlays();
    }

    /// Run due proofreads until nothing is scheduled.
    fn pump(self: &Rc<Self>) {
        if self.pumping.replace(true) {
            return;
        }
        let this = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            while let Some(due) = this.session.next_due() {
                let wait = due.saturating_duration_since(Instant::now());
                if !wait.is_zero() {
                    TimeoutFuture::new(wait.as_millis().min(u32::MAX as u128) as u32).await;
                }
                this.session.poll(Instant::now());
                this.session.drain().await;
            }
            this.pumping.set(false);
        });
    }

    /// Proofread `surface` immediately, bypassing the debounce.
    pub fn request_now(self: &Rc<Self>, surface: SurfaceId, scope: Scope) -> Result<()> {
        self.session.request_now(surface, scope)?;
        let this = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            this.session.drain().await;
        });
        Ok(())
    }

    fn dom_surface(&self, surface: SurfaceId) -> Result<DomSurface> {
        let (node, kind) = self
            .session
            .node(surface)
            .ok_or(ScribeError::UnknownSurface(surface))?;
        let element = node
            .html_element()
            .ok_or_else(|| PlatformError::from("surface is not an HTML element"))?;
        Ok(DomSurface::new(element, kind)?)
    }

    /// Apply one issue. The re-proofread it schedules runs on the pump.
    pub fn apply(self: &Rc<Self>, surface: SurfaceId, issue: &IssueId) -> Result<ApplyOutcome> {
        let mut target = self.dom_surface(surface)?;
        let outcome = self.session.apply(surface, issue, &mut target)?;
        self.pump();
        Ok(outcome)
    }

    pub fn undo(self: &Rc<Self>, surface: SurfaceId) -> Result<bool> {
        let mut target = self.dom_surface(surface)?;
        let undone = self.session.undo(surface, &mut target)?;
        if undone {
            self.pump();
        }
        Ok(undone)
    }

    pub fn redo(self: &Rc<Self>, surface: SurfaceId) -> Result<bool> {
        let mut target = self.dom_surface(surface)?;
        let redone = self.session.redo(surface, &mut target)?;
        if redone {
            self.pump();
        }
        Ok(redone)
    }

    fn surface_of(&self, event: &web_sys::Event) -> Option<(DomNode, SurfaceId)> {
        let node = event_node(&self.document, event)?;
        let surface = self.session.surface_for(&node)?;
        Some((node, surface))
    }

    fn on_input(self: &Rc<Self>, event: &web_sys::Event) {
        let Some((_, surface)) = self.surface_of(event) else {
            return;
        };
        let Some((node, _)) = self.session.node(surface) else {
            return;
        };
        let text = node.current_text();
        let kind = self.session.on_input(&node, &text, Instant::now());
        if kind.is_none() {
            tracing::trace!(target: "scribe::browser", %surface, "input outside a tracked surface");
        }
        if needs_pump(kind, self.session.next_due()) {
            self.pump();
        }
    }

    fn on_pointer(&self, event: &web_sys::Event, activation: Activation) {
        let Some(mouse) = event.dyn_ref::<web_sys::MouseEvent>() else {
            return;
        };
        let Some((_, surface)) = self.surface_of(event) else {
            return;
        };
        let strategy = self.engine.borrow().strategy(surface);
        let target = match strategy {
            Some(Strategy::NativeRange) => {
                // The click has already placed the caret.
                let Some(caret) = self.dom_surface(surface).ok().and_then(|s| s.selection()) else {
                    return;
                };
                HitTarget::Offset(caret.head)
            }
            Some(_) => {
                let Some(element) = self.session.node(surface).and_then(|(n, _)| n.html_element()) else {
                    return;
                };
                let rect = element.get_bounding_client_rect();
                HitTarget::Point(Point::new(
                    mouse.client_x() as f64 - rect.left(),
                    mouse.client_y() as f64 - rect.top(),
                ))
            }
            None => return,
        };
        let activated = self.engine.borrow_mut().activate(surface, target, activation);
        if let Some(Activated::Selected(issue)) = activated {
            self.selected.emit(&issue);
        }
    }

    fn on_keydown(self: &Rc<Self>, event: &web_sys::Event) {
        let Some(keyboard) = event.dyn_ref::<web_sys::KeyboardEvent>() else {
            return;
        };
        let Some((_, surface)) = self.surface_of(event) else {
            return;
        };
        let key = Key::from_dom(&keyboard.key());
        let modifiers = Modifiers {
            ctrl: keyboard.ctrl_key(),
            alt: keyboard.alt_key(),
            shift: keyboard.shift_key(),
            meta: keyboard.meta_key(),
        };
        let handled = self.dom_surface(surface).and_then(|mut target| {
            self.session
                .handle_history_key(surface, &mut target, &key, modifiers, platform().uses_meta())
        });
        match handled {
            Ok(true) => {
                event.prevent_default();
                self.pump();
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(target: "scribe::browser", %surface, error = %e, "history step failed"),
        }
    }

    fn listen(self: &Rc<Self>) -> Result<()> {
        let target: web_sys::EventTarget = self.document.document().clone().into();
        let window: web_sys::EventTarget = web_sys::window()
            .ok_or(PlatformError::from("no window"))?
            .into();
        let capture = EventListenerOptions::run_in_capture_phase();
        let active_capture = EventListenerOptions {
            phase: EventListenerPhase::Capture,
            passive: false,
        };

        let mut listeners = self.listeners.borrow_mut();
        let weak = Rc::downgrade(self);
        let with = move |f: fn(&Rc<Self>, &web_sys::Event)| {
            let weak: Weak<Self> = weak.clone();
            move |event: &web_sys::Event| {
                if let Some(this) = weak.upgrade() {
                    f(&this, event);
                }
            }
        };

        listeners.push(EventListener::new_with_options(
            &target,
            "focusin",
            capture,
            with(|this, event| {
                if let Some(node) = event_node(&this.document, event) {
                    this.session.focus(&node);
                }
            }),
        ));
        listeners.push(EventListener::new_with_options(
            &target,
            "focusout",
            capture,
            with(|this, event| {
                if let Some(node) = event_node(&this.document, event) {
                    this.session.blur(&node);
                }
            }),
        ));
        listeners.push(EventListener::new_with_options(
            &target,
            "input",
            capture,
            with(|this, event| this.on_input(event)),
        ));
        listeners.push(EventListener::new_with_options(
            &target,
            "scroll",
            capture,
            with(|this, event| {
                if let Some((_, surface)) = this.surface_of(event) {
                    this.redraw(surface);
                }
            }),
        ));
        listeners.push(EventListener::new_with_options(
            &target,
            "click",
            capture,
            with(|this, event| this.on_pointer(event, Activation::Click)),
        ));
        listeners.push(EventListener::new_with_options(
            &target,
            "dblclick",
            capture,
            with(|this, event| this.on_pointer(event, Activation::DoubleClick)),
        ));
        listeners.push(EventListener::new_with_options(
            &target,
            "keydown",
            active_capture,
            with(|this, event| this.on_keydown(event)),
        ));
        listeners.push(EventListener::new(
            &window,
            "resize",
            with(|this, _| {
                for surface in this.attached.borrow().clone() {
                    this.redraw(surface);
                }
            }),
        ));
        Ok(())
    }

    /// Stop listening, remove every overlay and tear the session down.
    pub fn destroy(&self) {
        self.listeners.borrow_mut().clear();
        if let Some(feed) = self.feed.borrow_mut().take() {
            feed.disconnect();
        }
        self.subscriptions.borrow_mut().release_all();
        self.engine.borrow_mut().destroy();
        self.attached.borrow_mut().clear();
        self.session.destroy();
        tracing::info!(target: "scribe::browser", "proofreading stopped");
    }
}

/// Whether an input left a run scheduled. Mediated inputs from apply, undo and
/// redo schedule a re-proofread just like typing does.
fn needs_pump(kind: Option<InputKind>, next_due: Option<Instant>) -> bool {
    kind.is_some() && next_due.is_some()
}
