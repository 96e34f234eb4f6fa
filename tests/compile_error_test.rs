use colvm::{
    ColumnSchema, CompileError, Filter, FilterOp, Operand, QuerySpec, Schema, SortKey, Value,
    ValueKind, compile,
};

fn schema() -> Schema {
    Schema::new(vec![
        ColumnSchema::new("id", ValueKind::Id),
        ColumnSchema::new("age", ValueKind::Int32).nullable(),
        ColumnSchema::new("score", ValueKind::Double),
        ColumnSchema::new("name", ValueKind::String).nullable(),
    ])
}

fn error(spec: QuerySpec) -> CompileError {
    compile(&schema(), &spec).unwrap_err()
}

#[test]
fn test_unknown_columns() {
    assert_eq!(
        error(QuerySpec::new().filter(Filter::eq(4, 1))),
        CompileError::UnknownColumn {
            context: "filter",
            column: 4,
            schema_len: 4
        }
    );
    assert!(matches!(
        error(QuerySpec::new().order_by(SortKey::desc(10))),
        CompileError::UnknownColumn { context: "sort key", column: 10, .. }
    ));
    assert!(matches!(
        error(QuerySpec::new().distinct_on([1, 6])),
        CompileError::UnknownColumn { context: "distinct", column: 6, .. }
    ));
}

#[test]
fn test_pattern_operators_need_strings() {
    let err = error(QuerySpec::new().filter(Filter::glob(1, "1*")));
    assert_eq!(
        err,
        CompileError::IllegalOperator {
            filter: 0,
            column: "age".to_string(),
            kind: ValueKind::Int32,
            op: FilterOp::Glob
        }
    );
    let err = error(QuerySpec::new().filter(Filter::is_null(3)).filter(Filter::regex(2, "x")));
    assert!(matches!(err, CompileError::IllegalOperator { filter: 1, .. }));
}

#[test]
fn test_operand_types() {
    let err = error(QuerySpec::new().filter(Filter::eq(1, "thirty")));
    assert_eq!(
        err,
        CompileError::OperandTypeMismatch {
            filter: 0,
            column: "age".to_string(),
            kind: ValueKind::Int32,
            operand: "string"
        }
    );
    let err = error(QuerySpec::new().filter(Filter::lt(3, 5)));
    assert!(matches!(err, CompileError::OperandTypeMismatch { operand: "integer", .. }));

    let err = error(QuerySpec::new().filter(Filter::in_list(2, [Value::Double(1.0), Value::from("x")])));
    assert!(matches!(err, CompileError::OperandTypeMismatch { operand: "string", .. }));

    let glob_on_number = Filter::new(3, FilterOp::Glob, Operand::Scalar(Value::Int(3)));
    assert!(matches!(
        error(QuerySpec::new().filter(glob_on_number)),
        CompileError::OperandTypeMismatch { .. }
    ));
}

#[test]
fn test_type_errors_surface_after_a_statically_empty_filter() {
    // score is never null, so the first filter folds away the whole query
    let spec = QuerySpec::new()
        .filter(Filter::is_null(2))
        .filter(Filter::eq(1, "thirty"));
    assert!(matches!(error(spec), CompileError::OperandTypeMismatch { filter: 1, .. }));
}

#[test]
fn test_operand_shapes() {
    let cases = [
        (Filter::new(1, FilterOp::IsNull, Operand::Scalar(Value::Int(1))), "no operand"),
        (Filter::new(1, FilterOp::In, Operand::Scalar(Value::Int(1))), "a list of values"),
        (Filter::new(1, FilterOp::Lt, Operand::List(vec![Value::Int(1)])), "a single value"),
        (Filter::new(3, FilterOp::Regex, Operand::None), "a single value"),
    ];
    for (filter, expected) in cases {
        let err = error(QuerySpec::new().filter(filter));
        assert!(
            matches!(&err, CompileError::OperandShape { expected: e, .. } if *e == expected),
            "{:?}",
            err
        );
    }
}

#[test]
fn test_invalid_regex() {
    let err = error(QuerySpec::new().filter(Filter::regex(3, "(unclosed")));
    match err {
        CompileError::InvalidPattern { pattern, column, .. } => {
            assert_eq!(pattern, "(unclosed");
            assert_eq!(column, "name");
        }
        other => panic!("expected InvalidPattern, got {:?}", other),
    }
}

#[test]
fn test_sort_key_conflicts() {
    let err = error(
        QuerySpec::new()
            .order_by(SortKey::asc(1))
            .order_by(SortKey::asc(2))
            .order_by(SortKey::desc(1)),
    );
    assert_eq!(err, CompileError::ConflictingSortKeys { column: "age".to_string() });

    // an identical repeat is harmless
    let spec = QuerySpec::new().order_by(SortKey::asc(1)).order_by(SortKey::asc(1));
    assert!(compile(&schema(), &spec).is_ok());
}

#[test]
fn test_empty_distinct() {
    let err = error(QuerySpec::new().distinct_on(Vec::new()));
    assert_eq!(err, CompileError::EmptyDistinct);
    assert_eq!(err.to_string(), "distinct requires at least one column");
}

#[test]
fn test_error_messages_name_the_column() {
    let err = error(QuerySpec::new().filter(Filter::glob(1, "1*")));
    assert_eq!(
        err.to_string(),
        "filter 0: operator GLOB is not supported on int32 column 'age'"
    );
}
