use mongosession::cli::{Command, parse_pair, parse_sort, run};
use mongosession::models::User;
use mongosession::{DbQueryParams, QueryOperator, Session};

fn exec(session: &Session, cmd: Command) -> String {
    let mut out = Vec::new();
    run(session, cmd, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn users_of(output: &str) -> Vec<User> {
    output.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
}

#[test]
fn add_get_edit_delete_roundtrip() {
    let session = Session::in_memory();
    let added = users_of(&exec(&session, Command::UserAdd { name: "Ann".into(), email: "ann@x.io".into() }));
    assert_eq!(added.len(), 1);
    let id = added[0].id.clone().unwrap();

    let got = users_of(&exec(&session, Command::UserGet { id: id.clone() }));
    assert_eq!(got, added);

    let edited = users_of(&exec(
        &session,
        Command::UserEdit { id: id.clone(), name: "Ann B".into(), email: "ann@y.io".into() },
    ));
    assert_eq!(edited[0].name, "Ann B");
    assert_eq!(exec(&session, Command::UserCount { params: None }), "1\n");

    assert_eq!(exec(&session, Command::UserDelete { id: id.clone() }), "deleted=true\n");
    assert_eq!(exec(&session, Command::UserDelete { id: id.clone() }), "deleted=false\n");

    let mut sink = Vec::new();
    assert!(run(&session, Command::UserGet { id }, &mut sink).is_err());
    assert!(sink.is_empty());
}

#[test]
fn seed_list_page_and_count() {
    let session = Session::in_memory();
    assert_eq!(exec(&session, Command::UserSeed { count: 12 }), "inserted=12\n");
    assert_eq!(users_of(&exec(&session, Command::UserList)).len(), 12);

    let params = DbQueryParams::new().sort_by("Name", true).skip(10).take(5);
    let page = users_of(&exec(&session, Command::UserPage { params }));
    assert_eq!(page.len(), 2);
    assert!(page[0].name <= page[1].name);

    let any = DbQueryParams::new().with_param("Name", ".").with_param("Email", "@").with_operator(QueryOperator::Or);
    assert_eq!(exec(&session, Command::UserCount { params: Some(any) }), "12\n");

    assert_eq!(exec(&session, Command::UserDrop), "dropped=User\n");
    assert_eq!(exec(&session, Command::UserCount { params: None }), "0\n");
}

#[test]
fn search_and_find() {
    let session = Session::in_memory();
    exec(&session, Command::UserAdd { name: "zoe (admin)".into(), email: "z@x".into() });
    exec(&session, Command::UserAdd { name: "Adam".into(), email: "a@x".into() });

    let regex = users_of(&exec(&session, Command::UserSearch { pattern: "^ad".into() }));
    assert_eq!(regex.len(), 1);
    assert_eq!(regex[0].name, "Adam");

    let literal = users_of(&exec(&session, Command::UserFind { needle: "(ADMIN)".into() }));
    assert_eq!(literal.len(), 1);
    assert_eq!(literal[0].name, "zoe (admin)");

    let sorted = users_of(&exec(&session, Command::UserFind { needle: "a".into() }));
    let names: Vec<&str> = sorted.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Adam", "zoe (admin)"]);
}

#[test]
fn indexes_and_text_search() {
    let session = Session::in_memory();
    exec(&session, Command::UserAdd { name: "Ann Lee".into(), email: "ann@x".into() });
    exec(&session, Command::UserAdd { name: "Bob Lee".into(), email: "bob@x".into() });
    assert_eq!(exec(&session, Command::EnsureTtl), "ttl index ready\n");
    assert_eq!(
        exec(&session, Command::EnsureTextIndex { fields: vec!["Name".into()] }),
        "text index ready\n"
    );
    let hits = users_of(&exec(&session, Command::UserTextSearch { search: "lee".into(), skip: 1, limit: 0 }));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "Bob Lee");
}

#[test]
fn metrics_text_lists_counters() {
    let session = Session::in_memory();
    exec(&session, Command::UserList);
    let text = exec(&session, Command::Metrics);
    assert!(text.contains("mongosession_ops_total 1\n"));
    assert!(text.contains("mongosession_writes_total 0\n"));
}

#[test]
fn argument_helpers() {
    assert_eq!(parse_pair("Name=a=b").unwrap(), ("Name".into(), "a=b".into()));
    assert_eq!(parse_sort("-Date,Name"), vec![("Date".into(), false), ("Name".into(), true)]);
}
