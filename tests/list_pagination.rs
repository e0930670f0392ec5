mod test_support;

use serde_json::json;
use test_support::*;

fn seed_students(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    admin_token: &str,
    count: usize,
) {
    for i in 1..=count {
        create_student(
            stdin,
            reader,
            admin_token,
            &format!("s{:02}@test.school", i),
            "Student",
            &format!("S{:02}", i),
            "SS1 Silver",
        );
    }
}

#[test]
fn user_list_pages_past_the_end_are_empty() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_school(&mut stdin, &mut reader, "schoolhub-pages");
    seed_students(&mut stdin, &mut reader, &seed.admin_token, 23);

    let page1 = request_ok(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": seed.admin_token, "role": "student", "page": 1, "limit": 10 }),
    );
    assert_eq!(page1["users"].as_array().unwrap().len(), 10);
    assert_eq!(page1["pagination"]["total"], 23);
    assert_eq!(page1["pagination"]["pages"], 3);

    let page3 = request_ok(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": seed.admin_token, "role": "student", "page": 3, "limit": 10 }),
    );
    assert_eq!(page3["users"].as_array().unwrap().len(), 3);

    let page4 = request_ok(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": seed.admin_token, "role": "student", "page": 4, "limit": 10 }),
    );
    assert_eq!(page4["users"].as_array().unwrap().len(), 0);
    assert_eq!(page4["pagination"]["pages"], 3);
}

#[test]
fn middle_page_carries_the_right_slice() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_school(&mut stdin, &mut reader, "schoolhub-slice");
    seed_students(&mut stdin, &mut reader, &seed.admin_token, 12);

    let page2 = request_ok(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": seed.admin_token, "role": "student", "page": 2, "limit": 5 }),
    );
    let users = page2["users"].as_array().unwrap();
    let last_names: Vec<&str> = users.iter().map(|u| u["lastName"].as_str().unwrap()).collect();
    assert_eq!(last_names, vec!["S06", "S07", "S08", "S09", "S10"]);
    assert_eq!(page2["pagination"]["pages"], 3);
}

#[test]
fn limit_is_clamped_to_one_hundred() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_school(&mut stdin, &mut reader, "schoolhub-clamp");
    seed_students(&mut stdin, &mut reader, &seed.admin_token, 3);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": seed.admin_token, "limit": 500 }),
    );
    assert_eq!(result["pagination"]["limit"], 100);
}

#[test]
fn extreme_page_numbers_return_an_empty_page() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_school(&mut stdin, &mut reader, "schoolhub-huge-page");
    seed_students(&mut stdin, &mut reader, &seed.admin_token, 3);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": seed.admin_token, "page": i64::MAX, "limit": 10 }),
    );
    assert_eq!(result["users"].as_array().unwrap().len(), 0);
    assert_eq!(result["pagination"]["total"], 4);

    // The daemon is still alive and answering.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": seed.admin_token, "page": 1, "limit": 10 }),
    );
    assert_eq!(again["users"].as_array().unwrap().len(), 4);
}

#[test]
fn search_filters_before_pagination() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_school(&mut stdin, &mut reader, "schoolhub-search");
    seed_students(&mut stdin, &mut reader, &seed.admin_token, 12);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "admin.users.list",
        json!({ "sessionToken": seed.admin_token, "search": "s1", "limit": 5 }),
    );
    // S10, S11, S12 match: the total reflects the filtered set, not page one.
    assert_eq!(result["pagination"]["total"], 3);
    assert_eq!(result["pagination"]["pages"], 1);
}
