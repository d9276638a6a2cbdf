mod common;

use common::*;
use docorm::{bson::Bson, prelude::*, sdk::QueryTarget};

#[tokio::test(flavor = "current_thread")]
async fn not_equal_matches_the_union_of_less_and_greater() {
    let (_store, connection) = connect(HandleFlavour::Client);
    seed_users(&connection).await;
    let mut unknown = User { id: Some("u5".into()), name: "Kim".into(), age: None };
    unknown.save(&connection).await.unwrap();

    let base = User::query(&connection, &PathParams::new()).unwrap();
    let not_thirty = base.clone().where_("age", FieldOp::Ne, 30).get().await.unwrap();
    let below = base.clone().where_("age", FieldOp::Lt, 30).get().await.unwrap();
    let above = base.clone().where_("age", FieldOp::Gt, 30).get().await.unwrap();

    let mut union: Vec<User> = below.into_iter().chain(above).collect();
    union.sort_by(|a, b| a.id.cmp(&b.id));
    let mut not_thirty = not_thirty;
    not_thirty.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(not_thirty, union);
    assert_eq!(sorted_names(&not_thirty), vec!["Ann", "Joe"]);

    let plan = base.clone().where_("age", FieldOp::Ne, 30).plan().await.unwrap();
    assert_eq!(plan.filter, Some(Filter::ne("age", 30)));

    let raw = base.filter(Expr::field("age", FieldOp::Ne, 30));
    assert_eq!(raw.plan().await.unwrap().filter, Some(Filter::ne("age", 30)));
    assert_eq!(sorted_names(&raw.get().await.unwrap()), vec!["Ann", "Joe"]);
}

#[tokio::test(flavor = "current_thread")]
async fn materialization_is_deterministic() {
    let (_store, connection) = connect(HandleFlavour::Client);
    seed_users(&connection).await;

    let query = User::query(&connection, &PathParams::new())
        .unwrap()
        .where_("age", FieldOp::Gte, 18)
        .or_where("name", FieldOp::Eq, "Bob")
        .or_where("name", FieldOp::Eq, "Zoe")
        .order_by("age", SortDirection::Desc)
        .limit(5);

    assert_eq!(query.plan().await.unwrap(), query.plan().await.unwrap());
    assert_eq!(query.get().await.unwrap(), query.get().await.unwrap());
}

#[tokio::test(flavor = "current_thread")]
async fn client_bindings_nest_the_or_group_under_the_main_filter() {
    let (_store, connection) = connect(HandleFlavour::Client);
    seed_users(&connection).await;

    let query = User::query(&connection, &PathParams::new())
        .unwrap()
        .where_("age", FieldOp::Gte, 18)
        .or_where("name", FieldOp::Eq, "Ann")
        .or_where("name", FieldOp::Eq, "Joe");

    let plan = query.plan().await.unwrap();
    assert_eq!(
        plan.filter,
        Some(Expr::And(vec![
            Expr::And(vec![Filter::gte("age", 18)]),
            Expr::Or(vec![Filter::eq("full_name", "Ann"), Filter::eq("full_name", "Joe")]),
        ]))
    );
    assert_eq!(names(&query.get().await.unwrap()), vec!["Joe"]);
}

#[tokio::test(flavor = "current_thread")]
async fn server_bindings_honor_only_the_first_or_branch() {
    let (_store, connection) = connect(HandleFlavour::Server);
    seed_users(&connection).await;

    let query = User::query(&connection, &PathParams::new())
        .unwrap()
        .or_where("name", FieldOp::Eq, "Ann")
        .or_where("name", FieldOp::Eq, "Joe")
        .or_where("name", FieldOp::Eq, "Zoe");

    assert_eq!(names(&query.get().await.unwrap()), vec!["Ann"]);
    assert_eq!(query.count().await.unwrap(), 1);

    let (_store, client) = connect(HandleFlavour::Client);
    seed_users(&client).await;
    let same = User::query(&client, &PathParams::new())
        .unwrap()
        .or_where("name", FieldOp::Eq, "Ann")
        .or_where("name", FieldOp::Eq, "Joe")
        .or_where("name", FieldOp::Eq, "Zoe");
    assert_eq!(sorted_names(&same.get().await.unwrap()), vec!["Ann", "Joe", "Zoe"]);
}

#[tokio::test(flavor = "current_thread")]
async fn merge_strategy_runs_every_branch() {
    let options = ConnectionOptions::new().server_or_strategy(ServerOrStrategy::MergeBranches);
    let (_store, connection) = connect_with(HandleFlavour::Server, options);
    seed_users(&connection).await;

    let query = User::query(&connection, &PathParams::new())
        .unwrap()
        .or_where("name", FieldOp::Eq, "Joe")
        .or_where("age", FieldOp::Lt, 35)
        .order_by("age", SortDirection::Desc)
        .limit(3);

    assert_eq!(names(&query.get().await.unwrap()), vec!["Joe", "Zoe", "Bob"]);
    assert_eq!(query.count().await.unwrap(), 3);
}

#[tokio::test(flavor = "current_thread")]
async fn start_after_reads_the_persisted_document() {
    let (_store, connection) = connect(HandleFlavour::Client);
    seed_users(&connection).await;

    let mut bob = User::find(&connection, &PathParams::new(), "u2").await.unwrap().unwrap();
    let query = User::query(&connection, &PathParams::new())
        .unwrap()
        .order_by("age", SortDirection::Asc)
        .start_after(&bob);

    // Unsaved edits do not move the cursor; Zoe ties with Bob on age and
    // sorts after him by id.
    bob.age = Some(100);
    assert_eq!(names(&query.get().await.unwrap()), vec!["Zoe", "Joe"]);

    // Saved edits do.
    bob.age = Some(35);
    bob.save(&connection).await.unwrap();
    assert_eq!(names(&query.get().await.unwrap()), vec!["Joe"]);
}

#[tokio::test(flavor = "current_thread")]
async fn cursor_on_a_deleted_document_fails() {
    let (_store, connection) = connect(HandleFlavour::Client);
    seed_users(&connection).await;

    let bob = user("u2", "Bob", 30);
    let query = User::query(&connection, &PathParams::new())
        .unwrap()
        .order_by("age", SortDirection::Asc)
        .end_before(&bob);
    assert_eq!(names(&query.get().await.unwrap()), vec!["Ann"]);

    bob.remove(&connection).await.unwrap();
    assert_eq!(query.get().await, Err(OrmError::DocumentNotFound("users/u2".into())));
}

#[tokio::test(flavor = "current_thread")]
async fn value_cursors_bound_the_ordering() {
    let (_store, connection) = connect(HandleFlavour::Server);
    seed_users(&connection).await;

    let users = User::query(&connection, &PathParams::new())
        .unwrap()
        .order_by("age", SortDirection::Asc)
        .start_at([Bson::Int32(30)])
        .end_at([Bson::Int32(42)])
        .get()
        .await
        .unwrap();

    assert_eq!(names(&users), vec!["Bob", "Zoe", "Joe"]);
}

#[tokio::test(flavor = "current_thread")]
async fn like_matches_text_fragments() {
    for flavour in [HandleFlavour::Client, HandleFlavour::Server] {
        let (_store, connection) = connect(flavour);
        seed_users(&connection).await;
        let base = User::query(&connection, &PathParams::new()).unwrap();

        let anywhere = base.clone().like("name", "%oe%").get().await.unwrap();
        assert_eq!(sorted_names(&anywhere), vec!["Joe", "Zoe"]);

        let prefix = base.clone().like("name", "jo%").get().await.unwrap();
        assert_eq!(names(&prefix), vec!["Joe"]);

        let exact = base.clone().like("name", "ann").get().await.unwrap();
        assert_eq!(names(&exact), vec!["Ann"]);
    }
}

#[tokio::test(flavor = "current_thread")]
async fn like_on_values_longer_than_the_index_window() {
    let options = ConnectionOptions::new().text_index_max_len(8);
    let (_store, connection) = connect_with(HandleFlavour::Client, options);
    let long_name = format!("{}XYZ", "a".repeat(8));
    User { id: Some("u1".into()), name: long_name.clone(), age: Some(1) }
        .save(&connection)
        .await
        .unwrap();
    let base = User::query(&connection, &PathParams::new()).unwrap();
    let count = |pattern: String| {
        let query = base.clone().like("name", &pattern);
        async move { query.count().await.unwrap() }
    };

    assert_eq!(count("a".repeat(8)).await, 0);
    assert_eq!(count(long_name.to_lowercase()).await, 1);
    assert_eq!(count("%xyz".into()).await, 1);
    assert_eq!(count("aaa%".into()).await, 1);
    assert_eq!(count("%aaa%".into()).await, 1);
    assert_eq!(count(format!("{}%", "a".repeat(9))).await, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn like_on_a_field_without_text_index_is_a_no_op() {
    let (_store, connection) = connect(HandleFlavour::Client);
    seed_users(&connection).await;
    let base = User::query(&connection, &PathParams::new()).unwrap();

    let ignored = base.clone().like("missing_field", "x");
    assert_eq!(ignored.plan().await.unwrap(), base.plan().await.unwrap());
    assert_eq!(ignored.get().await.unwrap().len(), 4);
}

#[tokio::test(flavor = "current_thread")]
async fn get_one_and_count() {
    let (_store, connection) = connect(HandleFlavour::Client);
    seed_users(&connection).await;

    let oldest = User::query(&connection, &PathParams::new())
        .unwrap()
        .order_by("age", SortDirection::Desc)
        .get_one()
        .await
        .unwrap();
    assert_eq!(oldest.map(|user| user.name), Some("Joe".to_string()));

    let thirties = User::where_(&connection, &PathParams::new(), "age", FieldOp::Eq, Bson::Int32(30)).unwrap();
    assert_eq!(thirties.count().await.unwrap(), 2);

    let nobody = User::find_one(&connection, &PathParams::new(), "name", FieldOp::Eq, "Eve".into())
        .await
        .unwrap();
    assert_eq!(nobody, None);
}

#[tokio::test(flavor = "current_thread")]
async fn empty_or_group_matches_nothing_on_every_binding() {
    use std::sync::Mutex;

    for flavour in [HandleFlavour::Client, HandleFlavour::Server, HandleFlavour::Bare] {
        let (_store, connection) = connect(flavour);
        seed_users(&connection).await;
        let base = User::query(&connection, &PathParams::new()).unwrap();

        let empty_or = base.clone().or_filter(Filter::or(Vec::<Expr>::new()));
        assert_eq!(empty_or.get().await.unwrap(), Vec::<User>::new(), "{flavour:?}");
        assert_eq!(empty_or.count().await.unwrap(), 0, "{flavour:?}");

        let nested = base.clone().filter(Filter::and([Filter::or(Vec::<Expr>::new())]));
        assert_eq!(nested.get().await.unwrap(), Vec::<User>::new(), "{flavour:?}");
        assert_eq!(nested.count().await.unwrap(), 0, "{flavour:?}");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = empty_or
            .on(move |users: Vec<User>| sink.lock().unwrap().push(users.len()))
            .await
            .unwrap();
        subscription.unsubscribe();
        assert_eq!(*seen.lock().unwrap(), vec![0], "{flavour:?}");
    }
}

#[tokio::test(flavor = "current_thread")]
async fn collection_group_spans_parents() {
    let (_store, connection) = connect(HandleFlavour::Client);
    for (org, id, role) in [("o1", "m1", "admin"), ("o1", "m2", "viewer"), ("o2", "m3", "admin")] {
        let mut member = Member { id: Some(id.into()), org_id: org.into(), role: role.into() };
        member.save(&connection).await.unwrap();
    }

    let query = Member::collection_query(&connection)
        .unwrap()
        .where_("role", FieldOp::Eq, "admin");
    assert_eq!(
        query.plan().await.unwrap().target,
        QueryTarget::CollectionGroup("members".into())
    );

    let mut ids: Vec<String> = query.get().await.unwrap().into_iter().filter_map(|m| m.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["m1", "m3"]);

    let o1 = Member::get_all(&connection, &PathParams::new().with("org_id", "o1")).await.unwrap();
    assert_eq!(o1.len(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn missing_path_parameter_is_an_error() {
    let (_store, connection) = connect(HandleFlavour::Client);

    let result = Member::query(&connection, &PathParams::new());
    assert_eq!(
        result.err(),
        Some(OrmError::MissingPathParameter {
            template: "orgs/{org_id}/members".into(),
            param: "org_id".into(),
        })
    );

    let mut orphan = Member { id: Some("m1".into()), org_id: String::new(), role: "admin".into() };
    assert!(matches!(orphan.save(&connection).await, Err(OrmError::InvalidPath(_))));
}

#[tokio::test(flavor = "current_thread")]
async fn subscriptions_deliver_changes_by_mode() {
    use std::sync::Mutex;

    let (_store, connection) = connect(HandleFlavour::Client);
    seed_users(&connection).await;

    let added = Arc::new(Mutex::new(Vec::new()));
    let modified = Arc::new(Mutex::new(Vec::new()));
    let adults = User::query(&connection, &PathParams::new())
        .unwrap()
        .where_("age", FieldOp::Gte, 18);

    let sink = added.clone();
    let on_added = adults
        .on_mode(ListenMode::Added, move |users: Vec<User>| {
            sink.lock().unwrap().push(sorted_names(&users).join(","));
        })
        .await
        .unwrap();
    let sink = modified.clone();
    let on_modified = adults
        .on_mode(ListenMode::Modified, move |users: Vec<User>| {
            sink.lock().unwrap().push(sorted_names(&users).join(","));
        })
        .await
        .unwrap();

    user("u6", "Lee", 50).save(&connection).await.unwrap();
    user("u3", "Joe", 43).save(&connection).await.unwrap();
    user("u7", "Kid", 5).save(&connection).await.unwrap();

    on_added.unsubscribe();
    user("u8", "Max", 60).save(&connection).await.unwrap();
    on_modified.unsubscribe();

    assert_eq!(*added.lock().unwrap(), vec!["Bob,Joe,Zoe", "Lee"]);
    assert_eq!(*modified.lock().unwrap(), vec!["Joe"]);
}

#[tokio::test(flavor = "current_thread")]
async fn listeners_on_degraded_bindings_use_the_chained_surface() {
    use std::sync::Mutex;

    let (_store, connection) = connect(HandleFlavour::Bare);
    seed_users(&connection).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = User::query(&connection, &PathParams::new())
        .unwrap()
        .on(move |users: Vec<User>| sink.lock().unwrap().push(users.len()))
        .await
        .unwrap();

    User { id: Some("u9".into()), name: "New".into(), age: Some(1) }
        .save(&connection)
        .await
        .unwrap();
    subscription.unsubscribe();

    assert_eq!(*seen.lock().unwrap(), vec![4, 5]);
}
