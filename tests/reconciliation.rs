//! End-to-end reconciliation through `MemoryDom`.

use spark_dom::{
    element, ArgShape, Bindings, Branch, Compiler, EffectId, Key, MemoryDom, NodeId, RenderHandle, Runtime,
    Value,
};

fn setup() -> (MemoryDom, NodeId, Runtime, Compiler) {
    let dom = MemoryDom::new();
    let body = dom.create_root("body");
    let rt = Runtime::new(dom.clone());
    let c = Compiler::for_runtime(&rt);
    (dom, body, rt, c)
}

fn first_effect(rt: &Runtime, handle: &RenderHandle) -> EffectId {
    rt.instance(handle.instance()).unwrap().effects()[0]
}

// =============================================================================
// Formatting
// =============================================================================

#[test]
fn test_unchanged_value_makes_no_output_call() {
    let (dom, body, mut rt, c) = setup();
    let count = c.cell("count", 0);
    let view = c.compile("counter", element("p").child(c.format(&count, |v| format!("n={v}"))));

    let handle = rt.render_with(&view, body, Bindings::new().cell(&count, 0)).unwrap();
    assert_eq!(dom.inner_html(body), "<p>n=0</p>");

    count.set(&mut rt, handle.context(), 5).unwrap();
    assert_eq!(dom.inner_html(body), "<p>n=5</p>");

    let calls = dom.calls();
    count.set(&mut rt, handle.context(), 5).unwrap();
    assert_eq!(dom.calls(), calls);
    assert_eq!(dom.inner_html(body), "<p>n=5</p>");
}

#[test]
fn test_attribute_and_style_follow_their_cells() {
    let (dom, body, mut rt, c) = setup();
    let hint = c.cell("hint", "");
    let width = c.cell("width", 0);
    let view = c.compile(
        "field",
        element("input")
            .bind(c.attribute("title", &hint))
            .bind(c.style_with("width", &width, |v| format!("{v}px"))),
    );

    let bindings = Bindings::new().cell(&hint, "name").cell(&width, 10);
    let handle = rt.render_with(&view, body, bindings).unwrap();
    let input = dom.children(body)[0];
    assert_eq!(dom.attribute(input, "title").as_deref(), Some("name"));
    assert_eq!(dom.style(input, "width").as_deref(), Some("10px"));

    width.set(&mut rt, handle.context(), 20).unwrap();
    assert_eq!(dom.style(input, "width").as_deref(), Some("20px"));
}

// =============================================================================
// Mapping
// =============================================================================

fn list_view(c: &Compiler) -> (spark_dom::Cell, std::rc::Rc<spark_dom::Template>) {
    let items = c.cell("items", Value::Null);
    let item = c.cell("item", Value::Null);
    let row = c.compile("row", element("li").child(c.text(&item)));
    let list = c.compile("list", element("ul").child(c.map_items(&items, &item, &row)));
    (items, list)
}

#[test]
fn test_list_middle_removal_keeps_positional_items() {
    let (dom, body, mut rt, c) = setup();
    let (items, list) = list_view(&c);

    let handle = rt
        .render_with(&list, body, Bindings::new().cell(&items, Value::list([10, 20, 30])))
        .unwrap();
    let mapping = first_effect(&rt, &handle);
    let before = rt.item_contexts(mapping);
    assert_eq!(before.len(), 3);
    assert_eq!(dom.inner_html(body), "<ul><li>10</li><li>20</li><li>30</li></ul>");

    items.set(&mut rt, handle.context(), Value::list([10, 30])).unwrap();
    let after = rt.item_contexts(mapping);

    assert_eq!(after, before[..2].to_vec());
    assert_eq!(after[1].0, Key::Index(1));
    assert!(!rt.store().contains(before[2].1));
    assert_eq!(dom.inner_html(body), "<ul><li>10</li><li>30</li></ul>");
}

#[test]
fn test_map_update_keeps_key_identity() {
    let (dom, body, mut rt, c) = setup();
    let (items, list) = list_view(&c);

    let initial = Value::map([("a", 1), ("b", 2), ("c", 3)]);
    let handle = rt.render_with(&list, body, Bindings::new().cell(&items, initial)).unwrap();
    let mapping = first_effect(&rt, &handle);
    let before = rt.item_contexts(mapping);

    items
        .set(&mut rt, handle.context(), Value::map([("a", 1), ("b", 20), ("c", 3)]))
        .unwrap();

    assert_eq!(rt.item_contexts(mapping), before);
    assert_eq!(dom.inner_html(body), "<ul><li>1</li><li>20</li><li>3</li></ul>");
}

#[test]
fn test_map_removal_disposes_only_that_key() {
    let (dom, body, mut rt, c) = setup();
    let (items, list) = list_view(&c);

    let handle = rt
        .render_with(&list, body, Bindings::new().cell(&items, Value::map([("a", 1), ("b", 2)])))
        .unwrap();
    let mapping = first_effect(&rt, &handle);
    let before = rt.item_contexts(mapping);
    let effects = rt.effect_count();

    let calls = dom.calls();
    items.set(&mut rt, handle.context(), Value::map([("a", 1)])).unwrap();
    let after = rt.item_contexts(mapping);

    assert_eq!(after, vec![before[0].clone()]);
    assert!(rt.store().contains(before[0].1));
    assert!(!rt.store().contains(before[1].1));
    // One text effect per item.
    assert_eq!(rt.effect_count(), effects - 1);
    assert_eq!(dom.calls().text, calls.text);
    assert_eq!(dom.inner_html(body), "<ul><li>1</li></ul>");
}

#[test]
fn test_new_items_are_appended_before_the_placeholder() {
    let (dom, body, mut rt, c) = setup();
    let (items, list) = list_view(&c);

    let handle = rt
        .render_with(&list, body, Bindings::new().cell(&items, Value::list([1])))
        .unwrap();
    items.append(&mut rt, handle.context(), 2).unwrap();
    items.append(&mut rt, handle.context(), 3).unwrap();

    assert_eq!(dom.inner_html(body), "<ul><li>1</li><li>2</li><li>3</li></ul>");
}

#[test]
fn test_atom_input_renders_one_item() {
    let (dom, body, mut rt, c) = setup();
    let (items, list) = list_view(&c);

    let handle = rt.render_with(&list, body, Bindings::new().cell(&items, 7)).unwrap();
    let mapping = first_effect(&rt, &handle);
    assert_eq!(rt.item_contexts(mapping)[0].0, Key::Atom);
    assert_eq!(rt.key(rt.item_contexts(mapping)[0].1), Some(&Key::Atom));
    assert_eq!(dom.inner_html(body), "<ul><li>7</li></ul>");
}

#[test]
fn test_empty_input_disposes_all_items() {
    let (dom, body, mut rt, c) = setup();
    let (items, list) = list_view(&c);

    let handle = rt
        .render_with(&list, body, Bindings::new().cell(&items, Value::list([1, 2, 3])))
        .unwrap();
    let mapping = first_effect(&rt, &handle);

    items.set(&mut rt, handle.context(), Value::list(Vec::<i64>::new())).unwrap();

    assert!(rt.item_contexts(mapping).is_empty());
    assert_eq!(rt.effect_count(), 1);
    assert_eq!(rt.instance_count(), 1);
    assert_eq!(dom.inner_html(body), "<ul></ul>");
}

#[test]
fn test_in_place_item_update_rewrites_one_text() {
    let (dom, body, mut rt, c) = setup();
    let (items, list) = list_view(&c);

    let handle = rt
        .render_with(&list, body, Bindings::new().cell(&items, Value::list([1, 2, 3])))
        .unwrap();
    let mapping = first_effect(&rt, &handle);
    let before = rt.item_contexts(mapping);

    let calls = dom.calls();
    items.set(&mut rt, handle.context(), Value::list([1, 5, 3])).unwrap();

    assert_eq!(rt.item_contexts(mapping), before);
    assert_eq!(dom.calls().text, calls.text + 1);
    assert_eq!(dom.calls().total(), calls.total() + 1);
    assert_eq!(dom.inner_html(body), "<ul><li>1</li><li>5</li><li>3</li></ul>");
}

#[test]
fn test_component_rows_receive_their_item() {
    let (dom, body, mut rt, c) = setup();
    let people = c.cell("people", Value::Null);
    let person = c.cell("person", Value::Null);
    let name = c.cell("name", "");
    let badge = c.component("badge", ArgShape::cells([&name]), element("em").child(c.text(&name)));
    let view = c.compile("people", element("ul").child(c.map_items(&people, &person, &badge)));

    let initial = Value::list([Value::map([("name", "ada")]), Value::map([("name", "grace")])]);
    let handle = rt.render_with(&view, body, Bindings::new().cell(&people, initial)).unwrap();
    assert_eq!(dom.inner_html(body), "<ul><em>ada</em><em>grace</em></ul>");

    let mapping = first_effect(&rt, &handle);
    let before = rt.item_contexts(mapping);
    let updated = Value::list([Value::map([("name", "ada")]), Value::map([("name", "hopper")])]);
    people.set(&mut rt, handle.context(), updated).unwrap();

    assert_eq!(rt.item_contexts(mapping), before);
    assert_eq!(dom.inner_html(body), "<ul><em>ada</em><em>hopper</em></ul>");
}

#[test]
fn test_unify_with_the_same_items_makes_no_call() {
    let (dom, body, mut rt, c) = setup();
    let (items, list) = list_view(&c);

    let handle = rt
        .render_with(&list, body, Bindings::new().cell(&items, Value::list([1, 2])))
        .unwrap();
    let mapping = first_effect(&rt, &handle);
    let value = rt.effect(mapping).unwrap().value().cloned();
    let contexts = rt.item_contexts(mapping);

    let calls = dom.calls();
    rt.unify(mapping, value.clone(), value.clone()).unwrap();
    assert_eq!(dom.calls(), calls);

    let same = rt.get(handle.context(), items.id()).unwrap();
    items.set(&mut rt, handle.context(), same).unwrap();
    assert_eq!(dom.calls(), calls);
    assert_eq!(rt.item_contexts(mapping), contexts);
    assert_eq!(dom.inner_html(body), "<ul><li>1</li><li>2</li></ul>");
}

// =============================================================================
// Conditional
// =============================================================================

#[test]
fn test_unify_with_the_same_branch_value_makes_no_call() {
    let (dom, body, mut rt, c) = setup();
    let flag = c.cell("flag", true);
    let yes = c.compile("yes", element("b"));
    let no = c.compile("no", element("i"));
    let view = c.compile(
        "toggle",
        element("div").child(c.choose(&flag, vec![Branch::value(true, &yes), Branch::default(&no)])),
    );

    let handle = rt.render_with(&view, body, Bindings::new().cell(&flag, true)).unwrap();
    let conditional = first_effect(&rt, &handle);
    let value = rt.effect(conditional).unwrap().value().cloned();
    let instances = rt.instance_count();

    let calls = dom.calls();
    rt.unify(conditional, value.clone(), value).unwrap();
    flag.set(&mut rt, handle.context(), true).unwrap();

    assert_eq!(dom.calls(), calls);
    assert_eq!(rt.instance_count(), instances);
    assert_eq!(rt.active_branch(conditional), Some(0));
    assert_eq!(dom.inner_html(body), "<div><b></b></div>");
}

#[test]
fn test_branch_contexts_are_cached() {
    let (dom, body, mut rt, c) = setup();
    let flag = c.cell("flag", 0);
    let zero = c.compile("zero", element("i").text("zero"));
    let one = c.compile("one", element("b").text("one"));
    let view = c.compile(
        "switch",
        element("div").child(c.choose(&flag, vec![Branch::value(0, &zero), Branch::value(1, &one)])),
    );

    let handle = rt.render_with(&view, body, Bindings::new().cell(&flag, 0)).unwrap();
    let conditional = first_effect(&rt, &handle);
    let first = rt.branch_contexts(conditional)[0].unwrap();
    assert_eq!(dom.inner_html(body), "<div><i>zero</i></div>");

    flag.set(&mut rt, handle.context(), 1).unwrap();
    assert_eq!(rt.active_branch(conditional), Some(1));
    assert_eq!(dom.inner_html(body), "<div><b>one</b></div>");

    let instances = rt.instance_count();
    flag.set(&mut rt, handle.context(), 0).unwrap();
    assert_eq!(rt.active_branch(conditional), Some(0));
    assert_eq!(rt.branch_contexts(conditional)[0], Some(first));
    assert_eq!(rt.instance_count(), instances);
    assert_eq!(dom.inner_html(body), "<div><i>zero</i></div>");
}

#[test]
fn test_predicate_and_default_branches() {
    let (dom, body, mut rt, c) = setup();
    let n = c.cell("n", 0);
    let big = c.compile("big", element("big"));
    let small = c.compile("small", element("small"));
    let view = c.compile(
        "size",
        element("p").child(c.choose(
            &n,
            vec![
                Branch::when(|v| v.as_int().is_some_and(|i| i > 100), &big),
                Branch::default(&small),
            ],
        )),
    );

    let handle = rt.render_with(&view, body, Bindings::new().cell(&n, 5)).unwrap();
    assert_eq!(dom.inner_html(body), "<p><small></small></p>");
    n.set(&mut rt, handle.context(), 500).unwrap();
    assert_eq!(dom.inner_html(body), "<p><big></big></p>");
}

#[test]
fn test_dispose_releases_cached_branches() {
    let (_dom, body, mut rt, c) = setup();
    let flag = c.cell("flag", true);
    let yes = c.compile("yes", element("b"));
    let no = c.compile("no", element("i"));
    let view = c.compile(
        "toggle",
        element("div").child(c.choose(&flag, vec![Branch::value(true, &yes), Branch::default(&no)])),
    );

    let handle = rt.render_with(&view, body, Bindings::new().cell(&flag, true)).unwrap();
    let conditional = first_effect(&rt, &handle);
    flag.toggle(&mut rt, handle.context()).unwrap();
    let cached: Vec<_> = rt.branch_contexts(conditional).into_iter().flatten().collect();
    assert_eq!(cached.len(), 2);

    handle.dispose(&mut rt).unwrap();
    assert!(cached.iter().all(|ctx| !rt.store().contains(*ctx)));
    assert_eq!(rt.instance_count(), 0);
    assert_eq!(rt.store().context_count(), 0);
}

// =============================================================================
// Nested templates
// =============================================================================

#[test]
fn test_included_component_receives_parameters() {
    let (dom, body, mut rt, c) = setup();
    let user = c.cell("user", Value::Null);
    let name = c.cell("name", "");
    let badge = c.component("badge", ArgShape::cells([&name]), element("em").child(c.text(&name)));
    let view = c.compile("card", element("div").child(c.include(&badge, Some((&user).into()))));

    let handle = rt
        .render_with(&view, body, Bindings::new().cell(&user, Value::map([("name", "ada")])))
        .unwrap();
    assert_eq!(dom.inner_html(body), "<div><em>ada</em></div>");

    user.set(&mut rt, handle.context(), Value::map([("name", "grace")])).unwrap();
    assert_eq!(dom.inner_html(body), "<div><em>grace</em></div>");
}

#[test]
fn test_fragment_parameter_arriving_late_is_rendered() {
    let (dom, body, mut rt, c) = setup();
    let data = c.cell("data", Value::Null);
    let title = c.cell("title", "");
    let heading = c.fragment("heading", ArgShape::cells([&title]), element("h1").child(c.text(&title)));
    let view = c.compile("page", element("div").child(c.include(&heading, Some((&data).into()))));

    let handle = rt
        .render_with(&view, body, Bindings::new().cell(&data, Value::map([("other", 1)])))
        .unwrap();
    assert!(!dom.inner_html(body).contains("hello"));

    data.set(&mut rt, handle.context(), Value::map([("title", "hello")])).unwrap();
    assert_eq!(dom.inner_html(body), "<div><h1>hello</h1></div>");

    data.set(&mut rt, handle.context(), Value::map([("title", "bye")])).unwrap();
    assert_eq!(dom.inner_html(body), "<div><h1>bye</h1></div>");
}

#[test]
fn test_dynamic_template_swap() {
    let (dom, body, mut rt, c) = setup();
    rt.templates_mut().register(c.compile("a", element("a")));
    rt.templates_mut().register(c.compile("b", element("b")));
    let which = c.cell("which", "a");
    let view = c.compile("dyn", element("div").child(c.dynamic(&which, None)));

    let handle = rt.render_with(&view, body, Bindings::new().cell(&which, "a")).unwrap();
    assert_eq!(dom.inner_html(body), "<div><a></a></div>");
    let instances = rt.instance_count();

    which.set(&mut rt, handle.context(), "b").unwrap();
    assert_eq!(dom.inner_html(body), "<div><b></b></div>");
    assert_eq!(rt.instance_count(), instances);
}

#[test]
fn test_missing_template_is_a_diagnostic() {
    let (dom, body, mut rt, c) = setup();
    let which = c.cell("which", "nope");
    let view = c.compile("dyn", element("div").child(c.dynamic(&which, None)));

    rt.render_with(&view, body, Bindings::new().cell(&which, "nope")).unwrap();

    assert_eq!(dom.inner_html(body), "<div></div>");
    let diagnostics = rt.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("could not find template 'nope'"));
}

#[test]
fn test_isolated_application_sees_only_shared_cells() {
    let (dom, body, mut rt, c) = setup();
    let title = c.cell("title", "");
    let secret = c.cell("secret", "");
    let inner = c.compile("inner", element("h1").child(c.text(&title)));
    let view = c.compile("shell", element("main").child(c.isolate(vec![title.clone()], &inner)));

    let bindings = Bindings::new().cell(&title, "T").cell(&secret, "S");
    let handle = rt.render_with(&view, body, bindings).unwrap();
    let application = first_effect(&rt, &handle);
    let scope = rt.instance(rt.nested_instance(application).unwrap()).unwrap().context();

    assert_eq!(rt.get(scope, title.id()), Some(Value::from("T")));
    assert_eq!(rt.get(scope, secret.id()), None);
    assert_eq!(dom.inner_html(body), "<main><h1>T</h1></main>");

    title.set(&mut rt, handle.context(), "U").unwrap();
    assert_eq!(dom.inner_html(body), "<main><h1>U</h1></main>");
}
