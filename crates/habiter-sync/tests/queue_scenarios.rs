//! End-to-end scenarios: API calls built by the factory, paced through the
//! call queue, with results landing in an observable sequence.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use habiter_model::{FilteringProxy, ObservableSeq};
use habiter_sync::{
    ActionError, ActionStatus, ApiCallFactory, ApiConfig, ApiError, ApiRequest, ApiResponse,
    CallQueue, Method, Performed, QueueError,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn server(request: &ApiRequest, _timeout: Duration) -> Result<ApiResponse, ApiError> {
    let path = request.url.trim_start_matches("http://test/");
    match (request.method, path) {
        (Method::Get, "status") => Ok(ApiResponse::new(200, "OK", json!({"ok": true}))),
        (Method::Get, "user/tasks") => Ok(ApiResponse::new(
            200,
            "OK",
            json!([
                {"id": "a", "text": "water plants", "completed": false},
                {"id": "b", "text": "write report", "completed": true},
                {"id": "c", "text": "call mom", "completed": false},
            ]),
        )),
        (Method::Get, "broken") => Ok(ApiResponse::new(503, "Service Unavailable", Value::Null)),
        (Method::Post, _) => Ok(ApiResponse::new(400, "Bad Request", json!({"err": "nope"}))),
        _ => Err(ApiError::Transport(format!("unroutable {path}"))),
    }
}

fn api() -> ApiCallFactory {
    ApiCallFactory::new(server, ApiConfig::default().with_base_url("http://test/"))
}

#[test]
fn loaded_tasks_flow_into_filtered_view() {
    let tasks: ObservableSeq<Value> = ObservableSeq::new();
    let open = FilteringProxy::new(&tasks, |t: &Value| t["completed"] == json!(false));

    let sink = tasks.clone();
    let mut queue = CallQueue::new();
    api()
        .get("load all tasks", "user/tasks")
        .with_postproc(move |json| {
            let items = json.as_array().cloned().unwrap_or_default();
            let count = items.len();
            sink.reset(items)
                .map_err(|e| ApiError::Malformed(e.to_string()))?;
            Ok(json!(count))
        })
        .enqueue(&mut queue)
        .unwrap();

    assert!(tasks.is_empty());
    assert_eq!(queue.perform_one(), Ok(Performed::Completed(json!(3))));

    let titles: Vec<Value> = open.to_vec().into_iter().map(|t| t["text"].clone()).collect();
    assert_eq!(titles, vec![json!("water plants"), json!("call mom")]);
}

#[test]
fn mixed_calls_keep_every_call_in_one_bucket() {
    let api = api();
    let mut queue = CallQueue::new();

    let ping = api.status().enqueue(&mut queue).unwrap();
    let score = api
        .post("upscore task \"a\"", "user/tasks/a/up", None)
        .enqueue(&mut queue)
        .unwrap();
    let down = api.get("check maintenance", "broken").enqueue(&mut queue).unwrap();

    let names = |queue: &CallQueue<Value, ApiError>| {
        (
            queue.due().with(|c| c.iter().map(ToString::to_string).collect::<Vec<_>>()),
            queue.done().with(|c| c.iter().map(ToString::to_string).collect::<Vec<_>>()),
        )
    };
    assert_eq!(
        names(&queue),
        (
            vec![
                "ping server for its status".to_owned(),
                "check maintenance".to_owned()
            ],
            vec!["upscore task \"a\"".to_owned()]
        )
    );

    assert_eq!(queue.perform_one(), Ok(Performed::Completed(json!(true))));
    assert_eq!(
        queue.perform_one(),
        Err(QueueError::Action(ActionError::Step {
            step: 0,
            error: ApiError::Unavailable("Service Unavailable".to_owned()),
        }))
    );
    assert_eq!(queue.perform_one(), Ok(Performed::Idle));

    let (due, done) = names(&queue);
    assert!(due.is_empty());
    assert_eq!(
        done,
        vec![
            "upscore task \"a\"".to_owned(),
            "ping server for its status".to_owned(),
            "check maintenance".to_owned(),
        ]
    );
    assert_eq!(ping.status(), ActionStatus::Completed);
    assert_eq!(score.status(), ActionStatus::Pending);
    assert_eq!(down.status(), ActionStatus::Failed);
}

#[test]
fn handled_api_failure_reports_through_handler() {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    let mut queue = CallQueue::new();
    api()
        .get("check maintenance", "broken")
        .on_error(move |err| sink.borrow_mut().push(err.to_string()))
        .enqueue(&mut queue)
        .unwrap();

    assert_eq!(queue.perform_one(), Ok(Performed::Recovered));
    assert_eq!(
        *errors.borrow(),
        vec!["API unavailable: Service Unavailable".to_owned()]
    );
}

#[test]
fn rejected_mutation_surfaces_server_message() {
    let mut action = api()
        .post("create task", "user/tasks/z", Some(json!({"text": "z"})))
        .into_action();
    assert_eq!(
        action.invoke(),
        Err(ActionError::Step {
            step: 0,
            error: ApiError::Rejected("nope".to_owned()),
        })
    );
    assert_eq!(action.error(), Some(&ApiError::Rejected("nope".to_owned())));
}
