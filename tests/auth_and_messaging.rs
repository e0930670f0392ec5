mod test_support;

use serde_json::json;
use test_support::*;

#[test]
fn missing_token_is_unauthorized() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _seed = seed_school(&mut stdin, &mut reader, "schoolhub-auth");

    let error = request_err(&mut stdin, &mut reader, "teacher.class.students", json!({}));
    assert_eq!(error["code"], "unauthorized");
    assert_eq!(error_status(&error), 401);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "teacher.class.students",
        json!({ "sessionToken": "no-such-token" }),
    );
    assert_eq!(error["code"], "unauthorized");
}

#[test]
fn role_mismatch_is_forbidden() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_school(&mut stdin, &mut reader, "schoolhub-roles");
    create_student(
        &mut stdin,
        &mut reader,
        &seed.admin_token,
        "ada@test.school",
        "Ada",
        "Abel",
        "SS1 Silver",
    );
    let student_token = login(
        &mut stdin,
        &mut reader,
        &seed.school_id,
        "ada@test.school",
        "student-pass",
    );

    let error = request_err(
        &mut stdin,
        &mut reader,
        "teacher.class.students",
        json!({ "sessionToken": student_token }),
    );
    assert_eq!(error["code"], "forbidden");
    assert_eq!(error_status(&error), 403);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": student_token }),
    );
    assert_eq!(error["code"], "forbidden");
}

#[test]
fn unknown_methods_are_reported() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let error = request_err(&mut stdin, &mut reader, "no.such.method", json!({}));
    assert_eq!(error["code"], "not_implemented");
}

#[test]
fn logout_revokes_the_session() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_school(&mut stdin, &mut reader, "schoolhub-logout");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "session.logout",
        json!({ "sessionToken": seed.admin_token }),
    );
    let error = request_err(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": seed.admin_token }),
    );
    assert_eq!(error["code"], "unauthorized");
}

#[test]
fn message_reaches_the_inbox_with_a_notification() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_school(&mut stdin, &mut reader, "schoolhub-msg");

    let _ada = create_student(
        &mut stdin,
        &mut reader,
        &seed.admin_token,
        "ada@test.school",
        "Ada",
        "Abel",
        "SS1 Silver",
    );
    let bola = create_student(
        &mut stdin,
        &mut reader,
        &seed.admin_token,
        "bola@test.school",
        "Bola",
        "Bello",
        "SS1 Silver",
    );
    let ada_token = login(&mut stdin, &mut reader, &seed.school_id, "ada@test.school", "student-pass");
    let bola_token = login(&mut stdin, &mut reader, &seed.school_id, "bola@test.school", "student-pass");

    let sent = request_ok(
        &mut stdin,
        &mut reader,
        "student.messages.send",
        json!({
            "sessionToken": ada_token,
            "recipientId": bola,
            "subject": "Study group",
            "body": "Library after school?",
        }),
    );
    let message_id = sent["messageId"].as_str().unwrap().to_string();

    let inbox = request_ok(
        &mut stdin,
        &mut reader,
        "student.messages.list",
        json!({ "sessionToken": bola_token }),
    );
    let messages = inbox["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["senderName"], "Ada Abel");
    assert_eq!(messages[0]["isRead"], false);

    let notes = request_ok(
        &mut stdin,
        &mut reader,
        "notifications.list",
        json!({ "sessionToken": bola_token }),
    );
    let notifications = notes["notifications"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["type"], "message");

    // Only the recipient can mark it read.
    let error = request_err(
        &mut stdin,
        &mut reader,
        "student.messages.markRead",
        json!({ "sessionToken": ada_token, "messageId": message_id }),
    );
    assert_eq!(error["code"], "not_found");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "student.messages.markRead",
        json!({ "sessionToken": bola_token, "messageId": message_id }),
    );
    let sent_box = request_ok(
        &mut stdin,
        &mut reader,
        "student.messages.list",
        json!({ "sessionToken": ada_token, "box": "sent" }),
    );
    assert_eq!(sent_box["messages"][0]["isRead"], true);
}

#[test]
fn messaging_outside_the_school_reads_as_absent() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_school(&mut stdin, &mut reader, "schoolhub-msg-scope");
    create_student(
        &mut stdin,
        &mut reader,
        &seed.admin_token,
        "ada@test.school",
        "Ada",
        "Abel",
        "SS1 Silver",
    );
    let ada_token = login(&mut stdin, &mut reader, &seed.school_id, "ada@test.school", "student-pass");

    let error = request_err(
        &mut stdin,
        &mut reader,
        "student.messages.send",
        json!({
            "sessionToken": ada_token,
            "recipientId": "some-other-school-user",
            "subject": "hi",
            "body": "hello",
        }),
    );
    assert_eq!(error["code"], "not_found");
}
