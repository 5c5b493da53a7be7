use super::*;
use crate::condition::{Condition, Filter, MultiFilter, SqlOp};
use crate::id::SequenceIdGenerator;
use crate::pagination::{Pagination, Sort};
use crate::param::Param;
use crate::record::{FieldDef, FieldValue, Record, assign_column};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_postgres::Row;

#[derive(Debug, Default, Clone)]
struct User {
    id: i64,
    name: String,
    nick_name: String,
    age: i32,
}

impl Record for User {
    fn fields() -> &'static [FieldDef] {
        const FIELDS: &[FieldDef] = &[
            FieldDef::scalar("id", "i64"),
            FieldDef::scalar("name", "String"),
            FieldDef {
                json: "nickName",
                ..FieldDef::scalar("nick_name", "String")
            },
            FieldDef::scalar("age", "i32"),
        ];
        FIELDS
    }

    fn field_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::bound(&self.id),
            FieldValue::bound(&self.name),
            FieldValue::bound(&self.nick_name),
            FieldValue::bound(&self.age),
        ]
    }

    fn set_field(&mut self, index: usize, row: &Row, column: usize) -> crate::OrmResult<()> {
        match index {
            0 => assign_column(&mut self.id, row, column)?,
            1 => assign_column(&mut self.name, row, column)?,
            2 => assign_column(&mut self.nick_name, row, column)?,
            3 => assign_column(&mut self.age, row, column)?,
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct Price {
    id: i64,
    amount: i32,
}

impl Record for Price {
    fn fields() -> &'static [FieldDef] {
        const FIELDS: &[FieldDef] = &[
            FieldDef {
                transform: "int8",
                ..FieldDef::scalar("id", "i64")
            },
            FieldDef {
                transform: "int4",
                ..FieldDef::scalar("amount", "i32")
            },
        ];
        FIELDS
    }

    fn field_values(&self) -> Vec<FieldValue> {
        vec![FieldValue::bound(&self.id), FieldValue::bound(&self.amount)]
    }

    fn set_field(&mut self, index: usize, row: &Row, column: usize) -> crate::OrmResult<()> {
        match index {
            0 => assign_column(&mut self.id, row, column)?,
            1 => assign_column(&mut self.amount, row, column)?,
            _ => {}
        }
        Ok(())
    }
}

fn ann() -> User {
    User {
        id: 0,
        name: "ann".to_string(),
        nick_name: String::new(),
        age: 0,
    }
}

// ==================== SELECT ====================

#[test]
fn test_simple_select() {
    let q = SelectBuilder::new("users");
    assert_eq!(q.build().unwrap().sql, "SELECT * FROM users");
}

#[test]
fn test_select_with_where() {
    let mut q = SelectBuilder::new("users");
    q.select(["id", "name"])
        .where_and([("status", Condition::eq("active"))]);
    let built = q.build().unwrap();
    assert_eq!(built.sql, r#"SELECT id,name FROM users WHERE "status" = $1"#);
    assert_eq!(built.args.len(), 1);
}

#[test]
fn test_build_is_repeatable() {
    let mut q = SelectBuilder::new("users");
    q.where_and([("status", Condition::eq("active"))]);
    let first = q.build().unwrap();
    let second = q.build().unwrap();
    assert_eq!(first.sql, second.sql);
    assert_eq!(second.args.len(), 1);
}

#[test]
fn test_select_for_record() {
    let q = SelectBuilder::for_record::<User>("users");
    assert_eq!(
        q.build().unwrap().sql,
        r#"SELECT id,name,"nick_name" as "nickName",age FROM users"#
    );
}

#[test]
fn test_count() {
    let mut q = SelectBuilder::count("users");
    q.where_and([("age", Condition::gte(18_i32))]);
    assert_eq!(
        q.build().unwrap().sql,
        r#"SELECT COUNT(*) FROM users WHERE "age" >= $1"#
    );
}

#[test]
fn test_select_replaces_same_alias() {
    let mut q = SelectBuilder::aliased("users", "u");
    q.select(["u.id", "u.name AS name"])
        .select(["lower(u.name) AS name"]);
    assert_eq!(
        q.build().unwrap().sql,
        "SELECT u.id,lower(u.name) AS name FROM users u"
    );
}

#[test]
fn test_where_and_then_or() {
    let mut q = SelectBuilder::new("users");
    q.where_and([("status", Condition::eq("active"))])
        .where_or([
            Filter::from([("role", Condition::eq("admin"))]),
            Filter::new()
                .and("role", Condition::eq("editor"))
                .and("age", Condition::gt(30_i32)),
        ]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"SELECT * FROM users WHERE "status" = $1 AND (("role" = $2) OR ("role" = $3 AND "age" > $4))"#
    );
    assert_eq!(built.args.len(), 4);
}

#[test]
fn test_empty_or_group_is_skipped() {
    let mut q = SelectBuilder::new("users");
    q.where_or([Filter::from([(
        "name",
        Condition::maybe::<String>(SqlOp::Eq, None),
    )])]);
    assert_eq!(q.build().unwrap().sql, "SELECT * FROM users");
}

#[test]
fn test_search() {
    let mut q = SelectBuilder::new("users");
    q.search("ann", &["name", "tags:array"]).search("", &["name"]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        "SELECT * FROM users WHERE (name ILIKE $1 OR EXISTS (SELECT 1 FROM unnest(tags) as val WHERE val ILIKE $2))"
    );
    assert_eq!(built.args.len(), 2);
}

#[test]
fn test_distinct_on() {
    let mut q = SelectBuilder::aliased("users", "u");
    q.distinct("u.id AS id", ["u.id"]).select(["u.name"]);
    assert_eq!(
        q.build().unwrap().sql,
        "SELECT DISTINCT ON (u.id) u.id AS id,u.name FROM users u"
    );
}

#[test]
fn test_joins() {
    let mut q = SelectBuilder::aliased("users", "u");
    q.select(["u.id"])
        .join_with("orders o", "o.user_id = u.id", [("o.status", Condition::eq("paid"))])
        .left_join("roles r", "r.id = u.role_id")
        .left_join("", "ignored")
        .where_and([("u.active", Condition::eq(true))]);
    assert_eq!(
        q.build().unwrap().sql,
        r#"SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id AND "o"."status" = $1 LEFT JOIN roles r ON r.id = u.role_id WHERE "u"."active" = $2"#
    );
}

#[test]
fn test_group_by_having() {
    let mut q = SelectBuilder::new("users");
    q.select(["status", "COUNT(*) AS total"])
        .group_by(["status"])
        .having([("COUNT(*)", Condition::gt(5_i64))]);
    assert_eq!(
        q.build().unwrap().sql,
        "SELECT status,COUNT(*) AS total FROM users GROUP BY status HAVING COUNT(*) > $1"
    );
}

#[test]
fn test_having_requires_group_by() {
    let mut q = SelectBuilder::new("users");
    q.having([("COUNT(*)", Condition::gt(5_i64))]);
    let err = q.build().unwrap_err();
    assert!(err.to_string().contains("GROUP BY"));
}

#[test]
fn test_order_by_resolves_alias() {
    let mut q = SelectBuilder::aliased("users", "u");
    q.select([r#"u.created_at AS "createdAt""#, "u.name"])
        .order_by(["createdAt"], false)
        .order_by(["u.name"], true);
    assert_eq!(
        q.build().unwrap().sql,
        r#"SELECT u.created_at AS "createdAt",u.name FROM users u ORDER BY u.created_at DESC NULLS LAST, u.name ASC NULLS FIRST"#
    );
}

#[test]
fn test_limit_offset() {
    let mut q = SelectBuilder::new("users");
    q.set_limit(10).set_offset(20);
    assert_eq!(q.build().unwrap().sql, "SELECT * FROM users LIMIT 10 OFFSET 20");

    q.set_limit(0);
    assert_eq!(q.build().unwrap().sql, "SELECT * FROM users");
}

#[test]
fn test_select_bool_and_case_when() {
    let mut q = SelectBuilder::aliased("users", "u");
    q.select_bool_and("u.paid = ?", "allPaid", vec![Param::new(true)])
        .select_case_when(
            "'adult'",
            "'minor'",
            "bracket",
            "u.age >= ?",
            vec![Param::new(18_i32)],
        );
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"SELECT bool_and(u.paid = $1) AS "allPaid",CASE WHEN u.age >= $2 THEN 'adult' ELSE 'minor' END AS "bracket" FROM users u"#
    );
    assert_eq!(built.args.len(), 2);
}

#[test]
fn test_array_aggregation() {
    let mut q = SelectBuilder::aliased("users", "u");
    q.select(["u.id"]).select_array_aggregation(
        "tags",
        "user_tags ut",
        ArrayAggConfig {
            expr: "ut.tag".to_string(),
            sort_by: "ut.tag".to_string(),
            sort_order: 1,
        },
    );
    assert_eq!(
        q.build().unwrap().sql,
        r#"SELECT u.id,(SELECT array_agg(ut.tag ORDER BY ut.tag ASC) FROM user_tags ut) AS "tags" FROM users u"#
    );
}

#[test]
fn test_array_aggregation_requires_expression() {
    let mut q = SelectBuilder::new("users");
    q.select_array_aggregation("tags", "", ArrayAggConfig::default());
    assert!(q.build().unwrap_err().to_string().contains("expression"));
}

#[test]
fn test_manual_placeholders() {
    let mut q = SelectBuilder::new("users");
    q.where_and([("status", Condition::eq("active"))]);
    let next = q.current_arg_index() + 1;
    q.select([format!("similarity(name, ${next}) AS score")])
        .add_args([Param::new("ann")]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"SELECT similarity(name, $2) AS score FROM users WHERE "status" = $1"#
    );
    assert_eq!(built.args.len(), 2);
}

#[test]
fn test_start_placeholder_from() {
    let mut q = SelectBuilder::new("orders");
    q.start_placeholder_from(3)
        .where_and([("user_id", Condition::eq(1_i64))]);
    let built = q.build().unwrap();
    assert_eq!(built.sql, r#"SELECT * FROM orders WHERE "user_id" = $3"#);
    assert_eq!(built.args.len(), 1);
}

#[test]
fn test_start_placeholder_from_counts_in_arg_index() {
    let mut q = SelectBuilder::new("orders");
    q.start_placeholder_from(3)
        .where_and([("user_id", Condition::eq(1_i64))]);
    assert_eq!(q.current_arg_index(), 3);

    let next = q.current_arg_index() + 1;
    q.select([format!("total > ${next} AS big")])
        .add_args([Param::new(100_i64)]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"SELECT total > $4 AS big FROM orders WHERE "user_id" = $3"#
    );
    assert_eq!(built.args.len(), 2);
}

#[test]
fn test_offset_sub_query_is_rebased_when_spliced() {
    let mut sub = SelectBuilder::new("orders");
    sub.start_placeholder_from(3)
        .where_and([("user_id", Condition::eq(1_i64))]);

    let mut q = SelectBuilder::new("o");
    q.with_cte("o", &sub);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"WITH o AS (SELECT * FROM orders WHERE "user_id" = $1) SELECT * FROM o"#
    );
    assert_eq!(built.args.len(), 1);

    let mut q = SelectBuilder::aliased("users", "u");
    q.where_and([("status", Condition::eq("active"))])
        .left_join_lateral("o", &sub, "TRUE", None);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"SELECT * FROM users u LEFT JOIN LATERAL (SELECT * FROM orders WHERE "user_id" = $2) o ON TRUE WHERE "status" = $1"#
    );
    assert_eq!(built.args.len(), 2);
}

// ==================== CTE / SUB-QUERIES ====================

#[test]
fn test_cte_placeholders_are_shifted() {
    let mut sub = SelectBuilder::new("orders");
    sub.select(["user_id"])
        .where_and([("total", Condition::gt(100_i32))]);

    let mut q = SelectBuilder::new("users");
    q.where_and([("status", Condition::eq("active"))])
        .with_cte("big", &sub)
        .where_and([("age", Condition::gte(18_i32))]);

    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"WITH big AS (SELECT user_id FROM orders WHERE "total" > $2) SELECT * FROM users WHERE "status" = $1 AND "age" >= $3"#
    );
    assert_eq!(built.args.len(), 3);
}

#[test]
fn test_recursive_cte() {
    let sub = SelectBuilder::new("nodes");
    let mut q = SelectBuilder::new("tree");
    q.with_cte("a", &sub).with_recursive_cte("tree", &sub);
    assert!(
        q.build()
            .unwrap()
            .sql
            .starts_with("WITH RECURSIVE a AS (SELECT * FROM nodes), tree AS")
    );
}

#[test]
fn test_failed_sub_query_is_reported() {
    let mut bad = SelectBuilder::new("orders");
    bad.having([("COUNT(*)", Condition::gt(1_i64))]);
    let mut q = SelectBuilder::new("users");
    q.with_cte("bad", &bad);
    assert!(q.build().is_err());
}

#[test]
fn test_left_join_lateral() {
    let mut sub = SelectBuilder::aliased("orders", "o");
    sub.select(["o.total"])
        .where_and([("o.state", Condition::eq("open"))])
        .set_limit(1);

    let mut q = SelectBuilder::aliased("users", "u");
    q.where_and([("u.id", Condition::eq(7_i64))])
        .left_join_lateral("last_order", &sub, "true", None);
    assert_eq!(
        q.build().unwrap().sql,
        r#"SELECT * FROM users u LEFT JOIN LATERAL (SELECT o.total FROM orders o WHERE "o"."state" = $2 LIMIT 1) last_order ON true WHERE "u"."id" = $1"#
    );
}

#[test]
fn test_union_all() {
    let mut a = SelectBuilder::new("admins");
    a.select(["id"]).where_and([("x", Condition::eq(1_i32))]);
    let mut b = SelectBuilder::new("editors");
    b.select(["id"]).where_and([("y", Condition::eq(2_i32))]);

    let mut q = SelectBuilder::new("ignored");
    q.union_all([&a, &b]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"SELECT id FROM admins WHERE "x" = $1 UNION ALL SELECT id FROM editors WHERE "y" = $2"#
    );
    assert_eq!(built.args.len(), 2);
}

#[test]
fn test_sub_query_condition() {
    let mut q = SelectBuilder::new("users");
    q.where_and([(
        "id",
        Condition::sub_query(SqlOp::In, "(SELECT user_id FROM orders)"),
    )]);
    assert_eq!(
        q.build().unwrap().sql,
        "SELECT * FROM users WHERE id IN (SELECT user_id FROM orders)"
    );
}

// ==================== PAGINATION ====================

#[test]
fn test_pagination_fused_query() {
    let mut q = SelectBuilder::aliased("users", "u");
    q.select(["u.id", "u.name"])
        .where_and([("u.status", Condition::eq("active"))])
        .paginate(&Pagination::new(2, 10).sort("u.name", 1));

    let built = q.build().unwrap();
    let expected = concat!(
        r#"WITH filtered_ids AS (SELECT u.id as id from users u WHERE "u"."status" = $1 ORDER BY u.name ASC NULLS FIRST), "#,
        "paginated_ids AS (SELECT id as id from filtered_ids LIMIT 10 OFFSET 10), ",
        "total_query AS (SELECT COUNT(id) from filtered_ids), ",
        "data_query AS (SELECT u.id,u.name FROM users u JOIN paginated_ids ON paginated_ids.id = u.id ORDER BY u.name ASC NULLS FIRST) ",
        "SELECT COALESCE((SELECT jsonb_agg(data_query) FROM data_query), '[]') AS data, ",
        "(SELECT COUNT FROM total_query) AS totalRecords"
    );
    assert_eq!(built.sql, expected);
    assert_eq!(built.args.len(), 1);
}

#[test]
fn test_pagination_without_limit() {
    let mut q = SelectBuilder::new("users");
    q.paginate(&Pagination::new(1, 0));
    let sql = q.build().unwrap().sql;
    assert!(sql.contains("paginated_ids AS (SELECT id as id from filtered_ids OFFSET 0)"));
    assert!(sql.contains("JOIN paginated_ids ON paginated_ids.id = users.id"));
}

#[test]
fn test_pagination_multi_sort_replaces_order() {
    let mut q = SelectBuilder::new("users");
    q.order_by(["created_at"], false).paginate(
        &Pagination::new(1, 5).multi_sort(vec![Sort::asc("name"), Sort::desc("age")]),
    );
    let sql = q.build().unwrap().sql;
    assert!(sql.contains("ORDER BY name ASC NULLS FIRST, age DESC NULLS LAST"));
    assert!(!sql.contains("created_at"));
}

#[test]
fn test_pagination_keeps_existing_ctes() {
    let mut sub = SelectBuilder::new("orders");
    sub.where_and([("total", Condition::gt(1_i32))]);
    let mut q = SelectBuilder::new("users");
    q.with_cte("big", &sub).paginate(&Pagination::new(1, 5));
    let sql = q.build().unwrap().sql;
    assert!(sql.starts_with(
        r#"WITH big AS (SELECT * FROM orders WHERE "total" > $1), filtered_ids AS"#
    ));
}

// ==================== JSON PROJECTIONS ====================

#[test]
fn test_json_aggregate_object_and_array() {
    let mut q = SelectBuilder::aliased("orders", "o");
    q.select_json_aggregate(
        "owner",
        [("name", "u.name"), ("id", "u.id")],
        JsonAggOptions::object(),
    )
    .select_json_aggregate(
        "items",
        [("sku", "i.sku")],
        JsonAggOptions::array()
            .order_by("i.sku")
            .condition("i.id IS NOT NULL"),
    );
    assert_eq!(
        q.build().unwrap().sql,
        concat!(
            r#"SELECT jsonb_build_object('id', u.id, 'name', u.name) AS "owner","#,
            r#"jsonb_agg(jsonb_build_object('sku', i.sku) ORDER BY i.sku) FILTER (WHERE i.id IS NOT NULL) AS "items" FROM orders o"#
        )
    );
}

#[test]
fn test_json_coalesce_and_distinct() {
    let mut q = SelectBuilder::aliased("orders", "o");
    q.select_json_coalesce("items", [("sku", "i.sku")], "'[]'::jsonb", JsonAggOptions::array())
        .select_json_distinct("tags", [("tag", "t.tag")], JsonAggOptions::array())
        .select_json_aggregate(
            "coupon",
            [("code", "c.code")],
            JsonAggOptions::object().condition("c.id IS NOT NULL"),
        );
    let sql = q.build().unwrap().sql;
    assert!(sql.contains(
        r#"COALESCE(jsonb_agg(jsonb_build_object('sku', i.sku)),'[]'::jsonb) AS "items""#
    ));
    assert!(sql.contains(r#"jsonb_agg(DISTINCT jsonb_build_object('tag', t.tag)) AS "tags""#));
    assert!(sql.contains(
        r#"CASE WHEN c.id IS NOT NULL THEN jsonb_build_object('code', c.code) ELSE NULL END AS "coupon""#
    ));
}

#[test]
fn test_json_empty_fields_are_ignored() {
    let mut q = SelectBuilder::new("orders");
    q.select_json_aggregate("owner", JsonFields::default(), JsonAggOptions::object());
    assert_eq!(q.build().unwrap().sql, "SELECT * FROM orders");
}

#[test]
fn test_json_aggregate_func_nests_objects() {
    let mut q = SelectBuilder::aliased("orders", "o");
    q.select(["o.id"]).select_json_aggregate_func("", |q| {
        q.select_json_aggregate("owner", [("id", "u.id")], JsonAggOptions::object())
            .select_json_aggregate("items", [("sku", "i.sku")], JsonAggOptions::array());
    });
    assert_eq!(
        q.build().unwrap().sql,
        concat!(
            r#"SELECT o.id,jsonb_agg(jsonb_build_object('sku', i.sku)) AS "items","#,
            r#"jsonb_build_object('owner', jsonb_build_object('id', u.id)) AS "json_result" FROM orders o"#
        )
    );
}

#[test]
fn test_json_array_elements() {
    let element: BTreeMap<String, String> =
        [("kind".to_string(), "book".to_string())].into_iter().collect();
    let mut q = SelectBuilder::new("orders");
    q.select_json_array_elements("", &[element]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"SELECT jsonb_array_elements($1::jsonb) AS "array_elements" FROM orders"#
    );
    assert_eq!(built.args.len(), 1);
}

#[test]
fn test_generate_cte_option() {
    let mut source = SelectBuilder::new("users");
    source.select(["users.id"]);

    let mut q = SelectBuilder::new("users");
    q.select(["users.id"])
        .generate_cte_option(source, "ownerOptions", "users", true, "users.name", "users.id", None)
        .group_by(["users.id"]);
    let sql = q.build().unwrap().sql;
    assert!(sql.starts_with(
        r#"WITH owner_options AS (SELECT DISTINCT ON ("users"."id") "users"."id" AS "value","users"."name" AS "key","users"."id" AS "id" FROM users)"#
    ));
    assert!(sql.contains(r#"LEFT JOIN owner_options ON "owner_options"."id" = "users"."id""#));
    assert!(sql.contains(r#"ORDER BY "owner_options"."key" ASC"#));
    assert!(sql.contains(r#", '[]'::jsonb) AS "ownerOptions""#));
}

#[test]
fn test_generate_cte_option_disabled() {
    let mut q = SelectBuilder::new("users");
    q.generate_cte_option(
        SelectBuilder::new("users"),
        "ownerOptions",
        "users",
        false,
        "name",
        "id",
        Some(&CustomSort::asc("name")),
    );
    assert_eq!(
        q.build().unwrap().sql,
        r#"SELECT '[]'::jsonb AS "ownerOptions" FROM users"#
    );
}

// ==================== INSERT ====================

#[test]
fn test_insert_one() {
    let mut q = InsertBuilder::new("users");
    q.id_generator(Arc::new(SequenceIdGenerator::new(100)))
        .insert_one(&ann());
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"INSERT INTO users (id,"name","nick_name","age",updated_at,created_at) VALUES ($1,$2,$3,$4,NOW(),NOW()) RETURNING id"#
    );
    assert_eq!(built.args.len(), 4);
}

#[test]
fn test_insert_exclude_empty() {
    let mut q = InsertBuilder::new("users");
    q.id_generator(Arc::new(SequenceIdGenerator::new(1)))
        .exclude_empty()
        .insert_one(&ann());
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"INSERT INTO users (id,"name",updated_at,created_at) VALUES ($1,$2,NOW(),NOW()) RETURNING id"#
    );
    assert_eq!(built.args.len(), 2);
}

#[test]
fn test_insert_many_with_conflict() {
    let users = vec![ann(), User { id: 9, ..ann() }];
    let mut q = InsertBuilder::new("users");
    q.insert_many(&users)
        .conflict("(id)", "NOTHING")
        .returning(["id", "name"]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        concat!(
            r#"INSERT INTO users (id,"name","nick_name","age",updated_at,created_at) "#,
            "VALUES ($1,$2,$3,$4,NOW(),NOW()),($5,$6,$7,$8,NOW(),NOW()) ",
            "ON CONFLICT (id) DO NOTHING RETURNING id,name"
        )
    );
    assert_eq!(built.args.len(), 8);
}

#[test]
fn test_insert_build_returning_overrides() {
    let mut q = InsertBuilder::new("users");
    q.insert_one(&ann());
    let built = q.build_returning(&["name".to_string()]).unwrap();
    assert!(built.sql.ends_with("RETURNING name"));
    assert!(q.build().unwrap().sql.ends_with("RETURNING id"));
}

#[test]
fn test_insert_errors() {
    let mut q = InsertBuilder::new("users");
    q.insert_many::<User>(&[]);
    assert!(q.build().unwrap_err().to_string().contains("empty slice"));

    let q = InsertBuilder::new("users");
    assert!(q.build().is_err());
}

// ==================== UPDATE ====================

#[test]
fn test_update_record() {
    let user = User {
        id: 1,
        name: "ann".to_string(),
        nick_name: "a".to_string(),
        age: 30,
    };
    let mut q = UpdateBuilder::new("users");
    q.set_record(&user).where_and([("id", Condition::eq(1_i64))]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"UPDATE users SET "id" = $1, "name" = $2, "nick_name" = $3, "age" = $4, "updated_at" = NOW() WHERE "id" = $5 RETURNING id"#
    );
    assert_eq!(built.args.len(), 5);
}

#[test]
fn test_update_record_exclude_empty() {
    let mut q = UpdateBuilder::new("users");
    q.exclude_empty()
        .set_record(&User { id: 1, ..ann() })
        .where_and([("id", Condition::eq(1_i64))]);
    assert_eq!(
        q.build().unwrap().sql,
        r#"UPDATE users SET "id" = $1, "name" = $2, "updated_at" = NOW() WHERE "id" = $3 RETURNING id"#
    );
}

#[test]
fn test_update_map_and_raw() {
    let mut q = UpdateBuilder::new("wallets");
    q.set_map(
        UpdateMap::new().set("used", 5_i32).raw(
            "available",
            "available - ?",
            vec![Param::new(5_i32)],
        ),
    )
    .where_and([("id", Condition::eq(7_i64))]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"UPDATE wallets SET "used" = $1, "available" = available - $2, "updated_at" = NOW() WHERE "id" = $3 RETURNING id"#
    );
    assert_eq!(built.args.len(), 3);
}

#[test]
fn test_update_keeps_explicit_updated_at() {
    let mut q = UpdateBuilder::new("wallets");
    q.set_map(UpdateMap::new().raw("updated_at", "NOW() - interval '1 day'", vec![]))
        .where_and([("id", Condition::eq(7_i64))]);
    let sql = q.build().unwrap().sql;
    assert_eq!(sql.matches("updated_at").count(), 1);
}

#[test]
fn test_update_increment() {
    let mut q = UpdateBuilder::new("users");
    q.increment([("loginCount", Param::new(1_i32))])
        .where_and([("id", Condition::eq(1_i64))]);
    assert_eq!(
        q.build().unwrap().sql,
        r#"UPDATE users SET "login_count" = "login_count" + $1, "updated_at" = NOW() WHERE "id" = $2 RETURNING id"#
    );
}

#[test]
fn test_update_case() {
    let mut q = UpdateBuilder::new("users");
    q.add_case("status", |c| {
        c.case(MultiFilter::and([("score", Condition::gte(90_i32))]), "gold")
            .otherwise_ref("status");
    })
    .where_and([("id", Condition::eq(1_i64))]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"UPDATE users SET status = CASE WHEN "score" >= $1 THEN $2 ELSE status END, "updated_at" = NOW() WHERE "id" = $3 RETURNING id"#
    );
    assert_eq!(built.args.len(), 3);
}

#[test]
fn test_update_each() {
    let prices = vec![Price { id: 1, amount: 10 }, Price { id: 2, amount: 20 }];
    let mut q = UpdateBuilder::new("prices");
    q.update_each(&prices, "id");
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        concat!(
            r#"UPDATE prices SET "amount" = v."amount", "updated_at" = NOW() "#,
            r#"FROM (VALUES ($1::int8, $2::int4), ($3::int8, $4::int4)) as v("id","amount") "#,
            r#"WHERE prices."id" = v."id" RETURNING id"#
        )
    );
    assert_eq!(built.args.len(), 4);
}

#[test]
fn test_update_each_requires_transform() {
    let mut q = UpdateBuilder::new("users");
    q.update_each(&[ann()], "id");
    assert!(q.build().unwrap_err().to_string().contains("transform"));
}

#[test]
fn test_update_from() {
    let mut q = UpdateBuilder::aliased("orders", "o");
    q.set_map(UpdateMap::new().set("state", "closed"))
        .from(["users u"])
        .where_and([("o.user_id", Condition::column_ref(SqlOp::Eq, "u.id"))])
        .where_and([("u.active", Condition::eq(false))]);
    assert_eq!(
        q.build().unwrap().sql,
        r#"UPDATE orders o SET "state" = $1, "updated_at" = NOW() FROM users u WHERE "o"."user_id" = u.id AND "u"."active" = $2 RETURNING id"#
    );
}

#[test]
fn test_update_requires_where_and_sets() {
    let mut q = UpdateBuilder::new("users");
    q.set_map(UpdateMap::new().set("name", "x"));
    assert!(q.build().unwrap_err().to_string().contains("WHERE"));

    let mut q = UpdateBuilder::new("users");
    q.where_and([("id", Condition::eq(1_i64))]);
    assert!(q.build().unwrap_err().to_string().contains("nothing to set"));
}

// ==================== DELETE ====================

#[test]
fn test_delete_using() {
    let mut q = DeleteBuilder::new("sessions");
    q.using(["users u"]).where_and([
        ("sessions.user_id", Condition::column_ref(SqlOp::Eq, "u.id")),
        ("u.active", Condition::eq(false)),
    ]);
    let built = q.build().unwrap();
    assert_eq!(
        built.sql,
        r#"DELETE FROM sessions USING users u WHERE "sessions"."user_id" = u.id AND "u"."active" = $1 RETURNING id"#
    );
    assert_eq!(built.args.len(), 1);
}

#[test]
fn test_delete_returning_columns() {
    let mut q = DeleteBuilder::new("sessions");
    q.where_and([("id", Condition::in_list(vec![1_i64, 2]))]);
    let built = q
        .build_returning(&["id".to_string(), "token".to_string()])
        .unwrap();
    assert_eq!(
        built.sql,
        r#"DELETE FROM sessions WHERE "id" IN ($1, $2) RETURNING id,token"#
    );
}

#[test]
fn test_delete_requires_where() {
    let q = DeleteBuilder::new("sessions");
    let err = q.build().unwrap_err();
    assert!(err.to_string().contains("WHERE"));

    // A filter that renders nothing does not count.
    let mut q = DeleteBuilder::new("sessions");
    q.where_and([("id", Condition::maybe::<i64>(SqlOp::Eq, None))]);
    assert!(q.build().is_err());
}

#[test]
fn test_statement_kinds() {
    assert_eq!(SelectBuilder::new("t").kind(), StatementKind::Select);
    assert_eq!(InsertBuilder::new("t").kind(), StatementKind::Insert);
    assert_eq!(UpdateBuilder::new("t").kind(), StatementKind::Update);
    assert_eq!(DeleteBuilder::new("t").kind(), StatementKind::Delete);
}
