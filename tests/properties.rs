use futures::executor::block_on;
use live_dom::{component_view, ComponentView, DomChange, ElementRef, InMessage, OutMessage, PropertyError, TreePath, XmlNs};
use serde_json::json;
use std::sync::Arc;

mod pages_;
use client_::Recorder;
use pages_::{click, qsid, render, shell, start, Slot};

/// An `input` at `2_1` declaring `input`, and a button at `2_2` that hands out its click's context.
fn form(input: &ElementRef, clicked: &Slot<live_dom::EventContext>) -> ComponentView<()> {
	let (input, clicked) = (input.clone(), Arc::clone(clicked));
	component_view(move |_: &(), _, context| {
		shell(context, |context| {
			context.element("input", |context| {
				context.add_ref(&input);
				Ok(())
			})?;
			context.element("button", |context| {
				let clicked = Arc::clone(&clicked);
				context.on("click", move |event| *clicked.lock() = Some(event));
				Ok(())
			})
		})
	})
}

fn clicked_form(input: &ElementRef) -> (Arc<live_dom::LivePage>, Recorder, live_dom::EventContext) {
	let clicked = Slot::default();
	let (page, recorder) = start(render((), form(input, &clicked)));
	click(&page, &[2, 2]);
	let event = clicked.lock().take().expect("click not handled");
	(page, recorder, event)
}

fn only_request(recorder: &Recorder) -> OutMessage {
	let mut messages = recorder.take();
	assert_eq!(messages.len(), 1);
	messages.remove(0)
}

#[test]
fn event_context_basics() {
	let (_page, _, event) = clicked_form(&ElementRef::new());
	assert_eq!(event.element_path(), &TreePath::of(&[2, 2]));
	assert_eq!(event.session_id(), &qsid());
	assert_eq!(event.event_object(), &serde_json::Value::Null);
}

#[test]
fn get_resolves_with_the_client_response() {
	let input = ElementRef::new();
	let (page, recorder, event) = clicked_form(&input);

	let value = event.props(&input).unwrap().get("value");
	let OutMessage::ExtractProperty { descriptor, path, name } = only_request(&recorder) else {
		panic!("expected a property request");
	};
	assert_eq!(path, TreePath::of(&[2, 1]));
	assert_eq!(name, "value");

	page.handle_message(InMessage::ExtractPropertyResponse {
		descriptor,
		result: Ok(json!("typed")),
	});
	assert_eq!(block_on(value), Ok(json!("typed")));
}

#[test]
fn responses_correlate_by_descriptor() {
	let input = ElementRef::new();
	let (page, recorder, event) = clicked_form(&input);
	let props = event.props(&input).unwrap();

	let width = props.get_string("width");
	let OutMessage::ExtractProperty { descriptor: first, .. } = only_request(&recorder) else {
		panic!("expected a property request");
	};
	let title = props.get_string("title");
	let OutMessage::ExtractProperty { descriptor: second, .. } = only_request(&recorder) else {
		panic!("expected a property request");
	};
	assert_ne!(first, second);

	page.handle_message(InMessage::ExtractPropertyResponse {
		descriptor: second,
		result: Ok(json!("hello")),
	});
	page.handle_message(InMessage::ExtractPropertyResponse {
		descriptor: first,
		result: Ok(json!(42)),
	});
	// Unknown and repeated descriptors are dropped.
	page.handle_message(InMessage::ExtractPropertyResponse {
		descriptor: first,
		result: Ok(json!(0)),
	});

	assert_eq!(block_on(width), Ok("42".to_owned()));
	assert_eq!(block_on(title), Ok("hello".to_owned()));
}

#[test]
fn client_errors_are_reported() {
	let (page, recorder, event) = clicked_form(&ElementRef::new());

	let result = event.eval_js("navigator.nope()");
	let OutMessage::EvalJs { descriptor, code } = only_request(&recorder) else {
		panic!("expected an evaluation request");
	};
	assert_eq!(code, "navigator.nope()");

	page.handle_message(InMessage::EvalJsResponse {
		descriptor,
		result: Err("TypeError".to_owned()),
	});
	assert_eq!(block_on(result), Err(PropertyError::Client("TypeError".to_owned())));
}

#[test]
fn undeclared_refs_are_stale() {
	let input = ElementRef::new();
	let (_page, _, event) = clicked_form(&input);
	assert_eq!(event.props(&ElementRef::new()).unwrap_err(), PropertyError::StaleRef);
	assert_eq!(event.props(&input.with_key("other")).unwrap_err(), PropertyError::StaleRef);
	assert_eq!(event.props(&input).unwrap().path(), &TreePath::of(&[2, 1]));
}

#[test]
fn keyed_refs_resolve_per_item() {
	let item = ElementRef::new();
	let clicked = Slot::default();
	let view = {
		let (item, clicked) = (item.clone(), Arc::clone(&clicked));
		component_view(move |_: &(), _, context| {
			context.element("ul", |context| {
				for key in ["a", "b"] {
					context.element("li", |context| {
						context.add_ref(&item.with_key(key));
						let clicked = Arc::clone(&clicked);
						context.on("click", move |event| *clicked.lock() = Some(event));
						Ok(())
					})?;
				}
				Ok(())
			})
		})
	};
	let (page, _) = start(render((), view));
	click(&page, &[1]);
	let event = clicked.lock().take().expect("click not handled");

	assert_eq!(event.props(&item.with_key("a")).unwrap().path(), &TreePath::of(&[1]));
	assert_eq!(event.props(&item.with_key("b")).unwrap().path(), &TreePath::of(&[2]));
	assert_eq!(event.props(&item).unwrap_err(), PropertyError::StaleRef);
}

#[test]
fn shutdown_abandons_pending_requests() {
	let input = ElementRef::new();
	let (page, recorder, event) = clicked_form(&input);
	let props = event.props(&input).unwrap();

	let pending = props.get("value");
	recorder.take();
	page.shutdown();
	assert_eq!(block_on(pending), Err(PropertyError::Abandoned));
	assert_eq!(block_on(props.get("value")), Err(PropertyError::Abandoned));
	assert_eq!(recorder.take(), vec![]);
}

#[test]
fn set_assigns_a_property() {
	let input = ElementRef::new();
	let (_page, recorder, event) = clicked_form(&input);

	event.props(&input).unwrap().set("value", "cleared").unwrap();
	assert_eq!(
		recorder.take(),
		vec![OutMessage::ModifyDom {
			changes: vec![DomChange::SetAttr {
				path: TreePath::of(&[2, 1]),
				ns: XmlNs::Html,
				name: "value".to_owned(),
				value: "cleared".to_owned(),
				is_property: true
			}]
		}]
	);
}

#[test]
fn set_href_navigates_away() {
	let (_page, recorder, event) = clicked_form(&ElementRef::new());
	event.set_href("https://example.com/").unwrap();
	assert_eq!(
		recorder.take(),
		vec![OutMessage::SetHref {
			href: "https://example.com/".to_owned()
		}]
	);
}
