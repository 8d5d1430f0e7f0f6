use std::rc::Rc;
use std::time::Duration;

pub use fiber_core::{ManualScheduler, StepDeadline};
use fiber_core::{
    Element, Event, HostOp, MemoryHost, NodeError, NodeId, Runtime, RuntimeConfig, SliceStatus,
};

const MAX_SLICES: usize = 10_000;

/// Headless harness for exercising render passes in tests.
///
/// Owns a runtime rendering into a [`MemoryHost`], driven by a
/// [`ManualScheduler`], and offers helpers to pump work, fire events and
/// inspect the resulting host tree.
pub struct RenderTestRule {
    runtime: Runtime<MemoryHost>,
    scheduler: Rc<ManualScheduler>,
    root: NodeId,
    content: Option<Element>,
}

impl RenderTestRule {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut host = MemoryHost::new();
        let root = host.create_root("root");
        let scheduler = Rc::new(ManualScheduler::new());
        let runtime = Runtime::with_config(host, root, scheduler.clone(), config);
        Self {
            runtime,
            scheduler,
            root,
            content: None,
        }
    }

    /// Installs `element` as the content and renders it to completion.
    pub fn set_content(&mut self, element: Element) -> Result<(), NodeError> {
        self.content = Some(element.clone());
        self.runtime.render(element);
        self.pump_until_idle()
    }

    /// Renders the installed content again from the top.
    pub fn rerender(&mut self) -> Result<(), NodeError> {
        if let Some(content) = self.content.clone() {
            self.runtime.render(content);
        }
        self.pump_until_idle()
    }

    /// Requests a render without running any work.
    pub fn render(&self, element: Element) {
        self.runtime.render(element);
    }

    /// Runs unbounded slices until nothing is left to build, surfacing the
    /// first host error. Leaves no idle slice armed.
    ///
    /// # Panics
    ///
    /// Panics when the runtime keeps producing work, e.g. a component that
    /// sets state on every render.
    pub fn pump_until_idle(&self) -> Result<(), NodeError> {
        let mut slices = 0;
        while self.runtime.has_pending_work() {
            if slices == MAX_SLICES {
                panic!("runtime still busy after {MAX_SLICES} slices");
            }
            self.runtime.run_slice(&Duration::MAX)?;
            slices += 1;
        }
        self.runtime.stop();
        Ok(())
    }

    /// Runs one slice that allows `units` units of work.
    pub fn step(&self, units: usize) -> Result<SliceStatus, NodeError> {
        self.runtime.run_slice(&StepDeadline::allowing(units))
    }

    /// Fires every listener registered on `node` for `event` and returns how
    /// many ran. Handlers run outside any borrow of the host.
    pub fn dispatch(&self, node: NodeId, event: &Event) -> usize {
        let handlers = self.runtime.with_host(|host| host.listeners(node, event.name()));
        for handler in &handlers {
            handler.call(event);
        }
        handlers.len()
    }

    /// Clicks the first node with `tag`. Returns `None` when no node matches.
    pub fn click(&self, tag: &str) -> Option<usize> {
        let node = self.find(tag)?;
        Some(self.dispatch(node, &Event::new("click")))
    }

    pub fn find(&self, tag: &str) -> Option<NodeId> {
        self.runtime.with_host(|host| host.find_by_tag(self.root, tag))
    }

    /// Concatenated text of every text node under `node`, in tree order.
    pub fn text_of(&self, node: NodeId) -> String {
        self.runtime.with_host(|host| {
            let mut text = String::new();
            let mut stack = vec![node];
            while let Some(id) = stack.pop() {
                if let Some(value) = host.node(id).and_then(|node| node.text_value()) {
                    text.push_str(value);
                }
                stack.extend(host.children(id).iter().rev().copied());
            }
            text
        })
    }

    pub fn dump(&self) -> String {
        self.runtime.with_host(|host| host.dump_tree(Some(self.root)))
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        self.runtime.with_host_mut(MemoryHost::take_ops)
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&MemoryHost) -> R) -> R {
        self.runtime.with_host(f)
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn runtime(&self) -> &Runtime<MemoryHost> {
        &self.runtime
    }

    pub fn scheduler(&self) -> Rc<ManualScheduler> {
        Rc::clone(&self.scheduler)
    }
}

impl Default for RenderTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `RenderTestRule`.
pub fn run_test_render<R>(f: impl FnOnce(&mut RenderTestRule) -> R) -> R {
    let mut rule = RenderTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiber_core::{children, create_element, use_state, Component, Props};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn toggle(_: &Props) -> Element {
        let (on, set_on) = use_state(false);
        let label = if on { "on" } else { "off" };
        create_element(
            "button",
            Props::new().on("onClick", move |_| set_on.update(|on| !on)),
            children![label],
        )
    }

    #[test]
    fn render_test_rule_reports_content_and_text() {
        init_logging();
        run_test_render(|rule| {
            assert!(!rule.has_content());
            rule.set_content(create_element(Component::new(toggle), Props::new(), children![]))
                .expect("initial render");
            assert!(rule.has_content());

            let button = rule.find("button").expect("button rendered");
            assert_eq!(rule.text_of(button), "off");

            assert_eq!(rule.click("button"), Some(1));
            rule.pump_until_idle().expect("rerender after click");
            assert_eq!(rule.text_of(button), "on");
            assert_eq!(rule.scheduler().queued(), 0);
        });
    }

    #[test]
    fn dump_lists_the_host_tree() {
        run_test_render(|rule| {
            rule.set_content(create_element(
                "p",
                Props::new().with("class", "note"),
                children!["hi"],
            ))
            .expect("render");
            assert_eq!(rule.dump(), "[0] <root>\n  [1] <p> class=note\n    [2] \"hi\"\n");
        });
    }
}
