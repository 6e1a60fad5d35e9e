use crate::panic::{join_error_panic_message, panic_message};

#[tokio::test]
async fn extracts_static_str_payload() {
	let handle = tokio::spawn(async { panic!("unit-str") });
	let err = handle.await.unwrap_err();
	let msg = join_error_panic_message(err).expect("should be a panic");
	assert_eq!(msg, "unit-str");
}

#[tokio::test]
async fn extracts_formatted_payload() {
	let handle = tokio::spawn(async { panic!("unit-{}", 7) });
	let err = handle.await.unwrap_err();
	let msg = join_error_panic_message(err).expect("should be a panic");
	assert_eq!(msg, "unit-7");
}

#[tokio::test]
async fn aborted_task_is_not_a_panic() {
	let handle = tokio::spawn(async {
		tokio::time::sleep(std::time::Duration::from_secs(60)).await;
	});
	handle.abort();
	let err = handle.await.unwrap_err();
	assert!(join_error_panic_message(err).is_none(), "aborted task should return None");
}

#[test]
fn opaque_payload_is_reported_generically() {
	let payload = std::panic::catch_unwind(|| std::panic::panic_any(42_u32)).unwrap_err();
	assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
}
