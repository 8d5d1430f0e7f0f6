//! Immutable element descriptions.
//!
//! An [`Element`] describes one node of the desired UI: which host tag or
//! component renders it, the properties it carries, and its ordered children.
//! Elements are cheap to clone; the property bag is shared behind an `Rc`.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

/// Reserved tag carried by text leaves.
pub const TEXT_ELEMENT: &str = "TEXT_ELEMENT";

/// Property holding the literal value of a text leaf.
pub const TEXT_VALUE: &str = "nodeValue";

/// Reserved property name for the child list. Never stored as an attribute.
pub const CHILDREN: &str = "children";

/// Tag of the synthetic root fiber that wraps the rendered element.
pub(crate) const ROOT_TAG: &str = "ROOT";

/// Payload handed to listeners when the host dispatches an event.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    name: String,
    value: Option<PropValue>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Attaches a value to the event, e.g. the current text of an input.
    pub fn with_value(mut self, value: impl Into<PropValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&PropValue> {
        self.value.as_ref()
    }
}

/// Event handler stored in a property bag.
///
/// Two listeners are equal only when they share the same allocation, so a
/// closure rebuilt on every render always counts as a changed handler.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&Event)>);

impl Listener {
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// A single property value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Listener(Listener),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_listener(&self) -> Option<&Listener> {
        match self {
            PropValue::Listener(listener) => Some(listener),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(value) => f.write_str(value),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Float(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Listener(_) => f.write_str("[listener]"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value.into())
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<Listener> for PropValue {
    fn from(value: Listener) -> Self {
        PropValue::Listener(value)
    }
}

/// Ordered property bag plus the element's children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Props {
    attributes: IndexMap<Rc<str>, PropValue>,
    children: Vec<Element>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Props::insert`].
    pub fn with(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Registers an event handler under `name`, which should follow the
    /// `onEvent` convention (`onClick`, `onInput`, ...).
    pub fn on(self, name: &str, handler: impl Fn(&Event) + 'static) -> Self {
        self.with(name, Listener::new(handler))
    }

    pub fn insert(&mut self, name: &str, value: impl Into<PropValue>) {
        if name == CHILDREN {
            log::debug!("ignoring attribute named `{CHILDREN}`; children are passed separately");
            return;
        }
        self.attributes.insert(Rc::from(name), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attributes.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Attributes and listeners in insertion order. Children are excluded.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_ref(), value))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub(crate) fn root(element: Element) -> Self {
        Self {
            attributes: IndexMap::new(),
            children: vec![element],
        }
    }
}

/// A function component.
///
/// Two components are the same when they render through the same function:
///
/// * a zero-sized render function (a `fn` item or a closure capturing
///   nothing) is identified by its type, so the same item or closure
///   expression matches on every render;
/// * a `fn(&Props) -> Element` pointer is identified by its address;
/// * anything else (capturing closures, boxed trait objects) is identified by
///   the component value itself, which clones share.
///
/// A matching component at the same position keeps its fiber and hook state;
/// a different one replaces it.
#[derive(Clone)]
pub struct Component {
    id: ComponentId,
    name: &'static str,
    render: Rc<dyn Fn(&Props) -> Element>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComponentId {
    Type(TypeId),
    Function(usize),
    Instance(usize),
}

impl Component {
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&Props) -> Element + 'static,
    {
        let function = (&render as &dyn Any)
            .downcast_ref::<fn(&Props) -> Element>()
            .map(|function| *function as usize);
        let render: Rc<dyn Fn(&Props) -> Element> = Rc::new(render);
        let id = match function {
            _ if std::mem::size_of::<F>() == 0 => ComponentId::Type(TypeId::of::<F>()),
            Some(address) => ComponentId::Function(address),
            None => ComponentId::Instance(Rc::as_ptr(&render) as *const () as usize),
        };
        Self {
            id,
            name: type_name::<F>(),
            render,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn render(&self, props: &Props) -> Element {
        (self.render)(props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

/// What renders an element. Resolved once per fiber.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    Host(Rc<str>),
    Component(Component),
    Text,
}

impl ElementKind {
    pub fn tag(&self) -> &str {
        match self {
            ElementKind::Host(tag) => tag,
            ElementKind::Component(component) => component.name(),
            ElementKind::Text => TEXT_ELEMENT,
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, ElementKind::Component(_))
    }
}

impl From<&str> for ElementKind {
    fn from(tag: &str) -> Self {
        ElementKind::Host(Rc::from(tag))
    }
}

impl From<String> for ElementKind {
    fn from(tag: String) -> Self {
        ElementKind::Host(Rc::from(tag))
    }
}

impl From<Component> for ElementKind {
    fn from(component: Component) -> Self {
        ElementKind::Component(component)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    kind: ElementKind,
    props: Rc<Props>,
}

impl Element {
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn tag(&self) -> &str {
        self.kind.tag()
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn children(&self) -> &[Element] {
        self.props.children()
    }

    /// The literal value of a text leaf, `None` for every other element.
    pub fn text_value(&self) -> Option<&PropValue> {
        match self.kind {
            ElementKind::Text => self.props.get(TEXT_VALUE),
            _ => None,
        }
    }

    pub(crate) fn shared_props(&self) -> Rc<Props> {
        Rc::clone(&self.props)
    }
}

/// A child argument of [`create_element`]: either an element or a bare value
/// that gets wrapped into a text leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Child {
    Element(Element),
    Text(PropValue),
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Element(element)
    }
}

impl From<&str> for Child {
    fn from(value: &str) -> Self {
        Child::Text(value.into())
    }
}

impl From<String> for Child {
    fn from(value: String) -> Self {
        Child::Text(value.into())
    }
}

impl From<i32> for Child {
    fn from(value: i32) -> Self {
        Child::Text(value.into())
    }
}

impl From<i64> for Child {
    fn from(value: i64) -> Self {
        Child::Text(value.into())
    }
}

impl From<f64> for Child {
    fn from(value: f64) -> Self {
        Child::Text(value.into())
    }
}

impl From<bool> for Child {
    fn from(value: bool) -> Self {
        Child::Text(value.into())
    }
}

/// Builds an element, wrapping bare child values into text leaves.
pub fn create_element(kind: impl Into<ElementKind>, props: Props, children: Vec<Child>) -> Element {
    let Props { attributes, .. } = props;
    let children = children
        .into_iter()
        .map(|child| match child {
            Child::Element(element) => element,
            Child::Text(value) => create_text_element(value),
        })
        .collect();
    Element {
        kind: kind.into(),
        props: Rc::new(Props {
            attributes,
            children,
        }),
    }
}

pub fn create_text_element(value: impl Into<PropValue>) -> Element {
    let mut attributes = IndexMap::new();
    attributes.insert(Rc::from(TEXT_VALUE), value.into());
    Element {
        kind: ElementKind::Text,
        props: Rc::new(Props {
            attributes,
            children: Vec::new(),
        }),
    }
}

/// Collects heterogeneous child arguments for [`create_element`].
///
/// ```
/// use fiber_core::{children, create_element, Props};
///
/// let heading = create_element(
///     "h1",
///     Props::new(),
///     children!["hello", create_element("br", Props::new(), children![]), "world!"],
/// );
/// assert_eq!(heading.children().len(), 3);
/// ```
#[macro_export]
macro_rules! children {
    () => {
        ::std::vec::Vec::<$crate::Child>::new()
    };
    ($($child:expr),+ $(,)?) => {
        ::std::vec![$($crate::Child::from($child)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: impl Into<PropValue>) -> Element {
        create_text_element(value)
    }

    #[test]
    fn text_element_from_string() {
        let element = create_text_element("foo");
        assert_eq!(element.tag(), TEXT_ELEMENT);
        assert_eq!(element.text_value(), Some(&PropValue::from("foo")));
        assert!(element.children().is_empty());
        assert_eq!(element.props().len(), 1);
    }

    #[test]
    fn text_element_from_number() {
        let element = create_text_element(1);
        assert_eq!(element.tag(), TEXT_ELEMENT);
        assert_eq!(element.text_value(), Some(&PropValue::Int(1)));
        assert!(element.children().is_empty());
    }

    #[test]
    fn empty_element_has_no_children() {
        let img = create_element("img", Props::new(), children![]);
        assert_eq!(img.tag(), "img");
        assert!(img.props().is_empty());
        assert!(img.children().is_empty());
    }

    #[test]
    fn attributes_are_kept() {
        let img = create_element("img", Props::new().with("src", "foo"), children![]);
        assert_eq!(img.props().get("src"), Some(&PropValue::from("foo")));
        assert!(img.children().is_empty());
    }

    #[test]
    fn children_keep_input_order_and_wrap_text() {
        let br = create_element("br", Props::new(), children![]);
        let heading = create_element(
            "h1",
            Props::new(),
            children!["hello", br.clone(), "world!"],
        );
        assert_eq!(heading.children(), &[text("hello"), br, text("world!")]);
    }

    #[test]
    fn children_attribute_is_reserved() {
        let props = Props::new().with(CHILDREN, "nope");
        assert!(!props.contains_key(CHILDREN));
    }

    #[test]
    fn component_identity_follows_render_function() {
        fn first(_: &Props) -> Element {
            create_text_element("first")
        }
        fn second(_: &Props) -> Element {
            create_text_element("second")
        }

        assert_eq!(Component::new(first), Component::new(first));
        assert_ne!(Component::new(first), Component::new(second));
    }

    #[test]
    fn function_pointers_are_told_apart() {
        fn first(_: &Props) -> Element {
            create_text_element("first")
        }
        fn second(_: &Props) -> Element {
            create_text_element("second")
        }

        let table: [fn(&Props) -> Element; 2] = [first, second];
        assert_eq!(Component::new(table[0]), Component::new(table[0]));
        assert_ne!(Component::new(table[0]), Component::new(table[1]));

        let boxed: Box<dyn Fn(&Props) -> Element> = Box::new(first);
        let other: Box<dyn Fn(&Props) -> Element> = Box::new(second);
        assert_ne!(Component::new(boxed), Component::new(other));
    }

    #[test]
    fn capturing_closures_match_their_own_clones() {
        let labelled = |label: &'static str| {
            Component::new(move |_: &Props| create_text_element(label))
        };
        let greeting = labelled("hi");
        assert_eq!(greeting, greeting.clone());
        assert_ne!(greeting, labelled("hi"));
    }

    #[test]
    fn listeners_compare_by_identity() {
        let listener = Listener::new(|_| {});
        assert_eq!(listener, listener.clone());
        assert_ne!(listener, Listener::new(|_| {}));
    }
}
