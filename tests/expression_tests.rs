//! Expression tests: rendering, column handling and the plan-file parser

use std::collections::HashMap;

use qopt_core::expr::{BinOp, Expr, UnaryOp};
use qopt_core::schema::{Column, ColumnId, DataType};
use qopt_core::types::Scalar;
use qopt_planner::dsl::expr::{parse_expression, parse_item, Ast};

fn column(id: u64, name: &str, nullable: bool) -> Column {
    Column::new(ColumnId(id), name, DataType::Int64, nullable)
}

fn ident(name: &str) -> Ast {
    Ast::Ident {
        qualifier: None,
        name: name.to_string(),
    }
}

#[test]
fn test_function_style_display() {
    let a = column(1, "test.t.a", false);
    let b = column(2, "test.t.b", true);
    let expr = Expr::binary(
        BinOp::And,
        Expr::binary(BinOp::Gt, Expr::col(&a), Expr::int(1)),
        Expr::in_list(Expr::col(&b), vec![Expr::int(2), Expr::int(3)]),
    );
    assert_eq!(expr.to_string(), "and(gt(test.t.a, 1), in(test.t.b, 2, 3))");
    assert_eq!(Expr::not_null(Expr::col(&b)).to_string(), "not(isnull(test.t.b))");
    assert_eq!(Expr::lit(Scalar::Null).to_string(), "<nil>");
    assert_eq!(Expr::lit(Scalar::Str("x".into())).to_string(), "\"x\"");
}

#[test]
fn test_split_conjunction() {
    let a = column(1, "test.t.a", false);
    let conds = Expr::binary(
        BinOp::And,
        Expr::binary(
            BinOp::And,
            Expr::equal(Expr::col(&a), Expr::int(1)),
            Expr::equal(Expr::col(&a), Expr::int(2)),
        ),
        Expr::binary(
            BinOp::Or,
            Expr::equal(Expr::col(&a), Expr::int(3)),
            Expr::equal(Expr::col(&a), Expr::int(4)),
        ),
    )
    .split_conjunction();
    assert_eq!(conds.len(), 3);
    assert_eq!(conds[2].to_string(), "or(eq(test.t.a, 3), eq(test.t.a, 4))");
}

#[test]
fn test_columns_in_first_occurrence_order() {
    let a = column(1, "test.t.a", false);
    let b = column(2, "test.t.b", true);
    let expr = Expr::binary(
        BinOp::Add,
        Expr::col(&b),
        Expr::binary(BinOp::Mul, Expr::col(&a), Expr::col(&b)),
    );
    let cols: Vec<ColumnId> = expr.columns().iter().map(|c| c.id).collect();
    assert_eq!(cols, vec![ColumnId(2), ColumnId(1)]);
    assert!(!expr.is_constant());
    assert!(Expr::binary(BinOp::Add, Expr::int(1), Expr::int(2)).is_constant());
}

#[test]
fn test_substitute() {
    let a = column(1, "test.t.a", false);
    let derived = Column::derived(ColumnId(9), DataType::Int64, false);
    let mut map = HashMap::new();
    map.insert(derived.id, Expr::binary(BinOp::Add, Expr::int(1), Expr::col(&a)));

    let expr = Expr::binary(BinOp::Gt, Expr::col(&derived), Expr::int(5));
    assert_eq!(expr.to_string(), "gt(Column#9, 5)");
    assert_eq!(expr.substitute(&map).to_string(), "gt(plus(1, test.t.a), 5)");
}

#[test]
fn test_types_and_nullability() {
    let a = column(1, "test.t.a", false);
    let b = column(2, "test.t.b", true);
    let sum = Expr::binary(BinOp::Add, Expr::col(&a), Expr::col(&b));
    assert_eq!(sum.data_type(), DataType::Int64);
    assert!(sum.nullable());
    assert_eq!(Expr::binary(BinOp::Div, Expr::col(&a), Expr::int(2)).data_type(), DataType::Float64);
    assert_eq!(Expr::equal(Expr::col(&a), Expr::int(2)).data_type(), DataType::Boolean);

    assert!(!Expr::unary(UnaryOp::IsNull, Expr::col(&b)).nullable());
    let guarded = Expr::If {
        cond: Box::new(Expr::unary(UnaryOp::IsNull, Expr::col(&b))),
        then: Box::new(Expr::int(0)),
        otherwise: Box::new(Expr::int(1)),
    };
    assert!(!guarded.nullable());
    assert_eq!(guarded.to_string(), "if(isnull(test.t.b), 0, 1)");
}

#[test]
fn test_flip_comparison() {
    assert_eq!(BinOp::Lt.flip(), BinOp::Gt);
    assert_eq!(BinOp::Ge.flip(), BinOp::Le);
    assert_eq!(BinOp::Eq.flip(), BinOp::Eq);
    assert_eq!(BinOp::parse("<>").unwrap(), BinOp::Ne);
    assert!(BinOp::parse("~").is_err());
}

#[test]
fn test_parse_precedence() {
    let ast = parse_expression("a + b * 2 > 3 and c = 1").unwrap();
    let Ast::Binary { op: BinOp::And, left, .. } = ast else {
        panic!("expected and at the top");
    };
    let Ast::Binary { op: BinOp::Gt, left: sum, .. } = *left else {
        panic!("expected comparison");
    };
    let Ast::Binary { op: BinOp::Add, right: product, .. } = *sum else {
        panic!("expected plus");
    };
    assert!(matches!(*product, Ast::Binary { op: BinOp::Mul, .. }));
}

#[test]
fn test_parse_predicates() {
    assert_eq!(
        parse_expression("t1.a is not null").unwrap(),
        Ast::Unary {
            op: UnaryOp::Not,
            arg: Box::new(Ast::Unary {
                op: UnaryOp::IsNull,
                arg: Box::new(Ast::Ident {
                    qualifier: Some("t1".into()),
                    name: "a".into(),
                }),
            }),
        }
    );
    assert_eq!(
        parse_expression("b not in (1, -2)").unwrap(),
        Ast::InList {
            expr: Box::new(ident("b")),
            list: vec![Ast::Literal(Scalar::I64(1)), Ast::Literal(Scalar::I64(-2))],
            negated: true,
        }
    );
}

#[test]
fn test_parse_items() {
    let item = parse_item("count(distinct b) as n").unwrap();
    assert_eq!(item.alias.as_deref(), Some("n"));
    assert_eq!(
        item.ast,
        Ast::Call {
            name: "count".into(),
            distinct: true,
            star: false,
            args: vec![ident("b")],
        }
    );

    let star = parse_item("count(*)").unwrap();
    assert!(matches!(star.ast, Ast::Call { star: true, .. }));

    assert!(parse_item("a desc").unwrap().desc);
    assert!(!parse_item("a asc").unwrap().desc);
}

#[test]
fn test_parse_errors() {
    assert!(parse_expression("a +").is_err());
    assert!(parse_expression("(a = 1").is_err());
    assert!(parse_expression("a = 'open").is_err());
    assert!(parse_expression("a # 1").is_err());
    assert!(parse_item("a as 1").is_err());
}
