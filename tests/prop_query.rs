use mongosession::models::User;
use mongosession::query::{Filter, eval_filter, search_filter};
use mongosession::{DbQueryParams, QueryOperator, Session};
use proptest::prelude::*;

fn session_with(names: &[String]) -> Session {
    let session = Session::in_memory();
    let mut users: Vec<User> = names.iter().map(|n| User::new(n.clone(), format!("{n}@example.com"))).collect();
    session.add_many(&mut users).unwrap();
    session
}

proptest! {
    #[test]
    fn prop_paging_windows_partition_sorted_results(
        names in proptest::collection::vec("[a-zA-Z]{1,8}", 0..40),
        page_size in 1u64..7,
    ) {
        let session = session_with(&names);
        let first = DbQueryParams::new().sort_by("Name", true).take(page_size);
        let mut params = first.clone();
        let mut seen = Vec::new();
        loop {
            let page: Vec<User> = session.page(&params).unwrap();
            prop_assert!(page.len() as u64 <= page_size);
            if page.is_empty() {
                break;
            }
            seen.extend(page.into_iter().map(|u| u.name));
            params = params.next_page();
        }
        let mut expected = names.clone();
        expected.sort();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn prop_and_is_subset_of_or(
        names in proptest::collection::vec("[a-d]{1,6}", 1..30),
        a in "[a-d]{1,2}",
        b in "[a-d]{1,2}",
    ) {
        let session = session_with(&names);
        let pairs = [("Name", a.clone()), ("Name", b.clone())];
        let and: Vec<User> = session.search_with(pairs.clone(), QueryOperator::And).unwrap();
        let or: Vec<User> = session.search_with(pairs, QueryOperator::Or).unwrap();
        prop_assert!(and.len() <= or.len());
        for u in &and {
            prop_assert!(u.name.contains(&a) && u.name.contains(&b));
            prop_assert!(or.contains(u));
        }
        let expected_or = names.iter().filter(|n| n.contains(&a) || n.contains(&b)).count();
        prop_assert_eq!(or.len(), expected_or);
    }

    #[test]
    fn prop_contains_ci_is_literal(name in "[ -~]{0,12}", needle in "[ -~]{0,4}") {
        let doc = bson::doc! { "Name": name.clone() };
        let hit = eval_filter(&doc, &Filter::contains_ci("Name", &needle), &[]);
        prop_assert_eq!(hit, name.to_lowercase().contains(&needle.to_lowercase()));
    }

    #[test]
    fn prop_count_matching_agrees_with_select(names in proptest::collection::vec("[a-c]{1,5}", 0..25), frag in "[a-c]") {
        let session = session_with(&names);
        let params = DbQueryParams::new().with_param("Name", frag.clone()).take(1);
        let counted = session.count_matching::<User>(&params).unwrap();
        let selected: Vec<User> = session.select(&search_filter([("Name", frag.as_str())], QueryOperator::And)).unwrap();
        prop_assert_eq!(counted, selected.len() as u64);
    }
}
