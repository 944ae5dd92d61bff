use std::collections::HashSet;

use polars::prelude::*;
use thiserror::Error;

/// Columns stored as `Int64` after reading. Everything else numeric is `Float64`.
pub const INT_KEYS: &[&str] = &["season", "week", "new_week", "play_id"];

/// Suffix polars gives right-hand duplicates; such columns never survive a join.
pub const REMOVE_SUFFIX: &str = "_remove";

const ROW: &str = "__row";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("missing column `{0}`")]
    MissingColumn(String),
    #[error("join keys differ in arity ({left} left, {right} right)")]
    JoinArity { left: usize, right: usize },
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

pub type FrameResult<T> = Result<T, FrameError>;

fn is_numeric(dtype: &DataType) -> bool {
    dtype.is_integer() || dtype.is_float() || dtype.is_bool()
}

/// Casts key columns to `Int64`, other numeric columns to `Float64`, and
/// turns NaN into null.
pub fn standardize(mut df: DataFrame) -> FrameResult<DataFrame> {
    let mut replaced = Vec::new();
    for column in df.get_columns() {
        let name = column.name().clone();
        let dtype = column.dtype();
        let target = if INT_KEYS.contains(&name.as_str()) {
            (*dtype != DataType::Int64 && (is_numeric(dtype) || *dtype == DataType::Null))
                .then_some(DataType::Int64)
        } else {
            (*dtype != DataType::Float64 && (is_numeric(dtype) || *dtype == DataType::Null))
                .then_some(DataType::Float64)
        };
        let cast = match &target {
            Some(t) => column.cast(t)?,
            None => column.clone(),
        };
        if *cast.dtype() == DataType::Float64
            && cast.f64()?.into_iter().any(|v| v.is_some_and(f64::is_nan))
        {
            let values: Vec<Option<f64>> =
                cast.f64()?.into_iter().map(|v| v.filter(|x| !x.is_nan())).collect();
            replaced.push(Column::new(name, values));
        } else if target.is_some() {
            replaced.push(cast);
        }
    }
    for column in replaced {
        df.with_column(column)?;
    }
    Ok(df)
}

pub fn has(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn require(df: &DataFrame, name: &str) -> FrameResult<()> {
    if has(df, name) {
        Ok(())
    } else {
        Err(FrameError::MissingColumn(name.to_string()))
    }
}

pub fn names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|n| n.to_string()).collect()
}

fn column_as(df: &DataFrame, name: &str, dtype: &DataType) -> FrameResult<Column> {
    let column = df
        .column(name)
        .map_err(|_| FrameError::MissingColumn(name.to_string()))?;
    Ok(column.cast(dtype)?)
}

pub fn floats(df: &DataFrame, name: &str) -> FrameResult<Vec<Option<f64>>> {
    let column = column_as(df, name, &DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Like [`floats`], but an absent column reads as all null.
pub fn floats_or_null(df: &DataFrame, name: &str) -> FrameResult<Vec<Option<f64>>> {
    if has(df, name) {
        floats(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

pub fn ints(df: &DataFrame, name: &str) -> FrameResult<Vec<Option<i64>>> {
    let column = column_as(df, name, &DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

pub fn texts(df: &DataFrame, name: &str) -> FrameResult<Vec<Option<String>>> {
    let column = column_as(df, name, &DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

pub fn texts_or_null(df: &DataFrame, name: &str) -> FrameResult<Vec<Option<String>>> {
    if has(df, name) {
        texts(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

pub fn f64_at(df: &DataFrame, name: &str, row: usize) -> Option<f64> {
    df.column(name)
        .ok()?
        .cast(&DataType::Float64)
        .ok()?
        .f64()
        .ok()?
        .get(row)
        .filter(|v| !v.is_nan())
}

pub fn str_at(df: &DataFrame, name: &str, row: usize) -> Option<String> {
    df.column(name)
        .ok()?
        .cast(&DataType::String)
        .ok()?
        .str()
        .ok()?
        .get(row)
        .map(str::to_string)
}

/// Adds an all-null column unless one by that name exists.
pub fn ensure_column(df: &mut DataFrame, name: &str, dtype: &DataType) -> FrameResult<()> {
    if !has(df, name) {
        df.with_column(Series::full_null(name.into(), df.height(), dtype))?;
    }
    Ok(())
}

pub fn select_present(df: &DataFrame, columns: &[&str]) -> FrameResult<DataFrame> {
    let present: Vec<&str> = columns.iter().copied().filter(|c| has(df, c)).collect();
    Ok(df.select(present)?)
}

pub fn drop_present(df: &DataFrame, columns: &[&str]) -> DataFrame {
    let present: Vec<&str> = columns.iter().copied().filter(|c| has(df, c)).collect();
    df.drop_many(present)
}

/// Renames `(from, to)` pairs whose source exists, replacing any column
/// already called `to`.
pub fn rename_present(df: &mut DataFrame, pairs: &[(&str, &str)]) -> FrameResult<()> {
    for &(from, to) in pairs {
        if !has(df, from) || from == to {
            continue;
        }
        if has(df, to) {
            *df = df.drop(to)?;
        }
        df.rename(from, to.into())?;
    }
    Ok(())
}

/// Stable sort, nulls last.
pub fn sort(df: &DataFrame, by: &[&str], descending: &[bool]) -> FrameResult<DataFrame> {
    for key in by {
        require(df, key)?;
    }
    let options = SortMultipleOptions::default()
        .with_order_descending_multi(descending.iter().copied())
        .with_nulls_last(true)
        .with_maintain_order(true);
    Ok(df.clone().lazy().sort(by.to_vec(), options).collect()?)
}

pub fn sort_asc(df: &DataFrame, by: &[&str]) -> FrameResult<DataFrame> {
    sort(df, by, &vec![false; by.len()])
}

/// Stacks frames over the union of their columns.
pub fn concat(frames: Vec<DataFrame>) -> FrameResult<DataFrame> {
    if frames.is_empty() {
        return Ok(DataFrame::empty());
    }
    let lazy: Vec<LazyFrame> = frames.into_iter().map(IntoLazy::lazy).collect();
    let args = UnionArgs {
        to_supertypes: true,
        ..Default::default()
    };
    Ok(concat_lf_diagonal(lazy, args)?.collect()?)
}

/// Joins in left row order. Right-hand columns that collide with a left
/// column are discarded, as are right keys.
pub fn join(
    left: &DataFrame,
    right: &DataFrame,
    left_on: &[&str],
    right_on: &[&str],
    how: JoinType,
) -> FrameResult<DataFrame> {
    if left_on.len() != right_on.len() {
        return Err(FrameError::JoinArity {
            left: left_on.len(),
            right: right_on.len(),
        });
    }
    for key in left_on {
        require(left, key)?;
    }
    for key in right_on {
        require(right, key)?;
    }

    let left_names: HashSet<String> = names(left).into_iter().collect();
    let mut right_side = right.clone();
    let mut right_keys = Vec::with_capacity(right_on.len());
    for (i, (l, r)) in left_on.iter().zip(right_on).enumerate() {
        if l == r {
            right_keys.push(r.to_string());
        } else {
            let alias = format!("__key{i}");
            right_side.rename(r, alias.as_str().into())?;
            right_keys.push(alias);
        }
    }
    let colliding: Vec<String> = names(&right_side)
        .into_iter()
        .filter(|n| !right_keys.contains(n) && left_names.contains(n))
        .collect();
    let mut right_side = right_side.drop_many(colliding);

    let mut left_side = left.clone();
    for (l, r) in left_on.iter().zip(&right_keys) {
        let lt = left_side.column(l)?.dtype().clone();
        let rt = right_side.column(r)?.dtype().clone();
        if lt == rt {
            continue;
        }
        let target = if lt == DataType::String || rt == DataType::String {
            DataType::String
        } else {
            DataType::Int64
        };
        let cast = left_side.column(l)?.cast(&target)?;
        left_side.with_column(cast)?;
        let cast = right_side.column(r)?.cast(&target)?;
        right_side.with_column(cast)?;
    }

    let left_exprs: Vec<Expr> = left_on.iter().map(|k| col(*k)).collect();
    let right_exprs: Vec<Expr> = right_keys.iter().map(|k| col(k.as_str())).collect();
    let joined = left_side
        .lazy()
        .with_row_index(ROW, None)
        .join(
            right_side.lazy(),
            left_exprs,
            right_exprs,
            JoinArgs::new(how).with_suffix(Some(REMOVE_SUFFIX.into())),
        )
        .sort([ROW], SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;

    let leftovers: Vec<String> = names(&joined)
        .into_iter()
        .filter(|n| {
            n == ROW
                || n.ends_with(REMOVE_SUFFIX)
                || (right_keys.contains(n) && !left_names.contains(n))
        })
        .collect();
    Ok(joined.drop_many(leftovers))
}

/// Keeps the first row for each key combination.
pub fn dedup_by(df: &DataFrame, keys: &[&str]) -> FrameResult<DataFrame> {
    for key in keys {
        require(df, key)?;
    }
    if keys.is_empty() || df.height() == 0 {
        return Ok(df.clone());
    }
    let partition: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    let out = df
        .clone()
        .lazy()
        .with_row_index(ROW, None)
        .filter(col(ROW).eq(col(ROW).min().over(partition)))
        .collect()?;
    Ok(out.drop(ROW)?)
}

pub fn dedup(df: &DataFrame) -> FrameResult<DataFrame> {
    let all = names(df);
    let keys: Vec<&str> = all.iter().map(String::as_str).collect();
    dedup_by(df, &keys)
}

/// Replaces infinities in float columns with `value`; returns how many.
pub fn replace_infinite(df: &mut DataFrame, value: f64) -> FrameResult<usize> {
    let float_columns: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| *c.dtype() == DataType::Float64)
        .map(|c| c.name().to_string())
        .collect();
    let mut replaced = 0;
    for name in float_columns {
        let values = floats(df, &name)?;
        let hits = values.iter().filter(|v| v.is_some_and(f64::is_infinite)).count();
        if hits == 0 {
            continue;
        }
        replaced += hits;
        let cleaned: Vec<Option<f64>> = values
            .into_iter()
            .map(|v| v.map(|x| if x.is_infinite() { value } else { x }))
            .collect();
        df.with_column(Series::new(name.as_str().into(), cleaned))?;
    }
    Ok(replaced)
}

/// True where every named column is non-null.
pub fn all_present(columns: &[&str]) -> Expr {
    columns
        .iter()
        .fold(lit(true), |acc, c| acc.and(col(*c).is_not_null()))
}

/// True where `column` equals one of `values`.
pub fn any_of<S: AsRef<str>>(column: &str, values: &[S]) -> Expr {
    values
        .iter()
        .fold(lit(false), |acc, v| acc.or(col(column).eq(lit(v.as_ref()))))
}
