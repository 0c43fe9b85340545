use std::cmp::Ordering;

use phf::phf_map;

use crate::env::Env;
use crate::error;
use crate::machine::Machine;
use crate::solve::{Cont, Promise};
use crate::term::{Indicator, Term};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    fn to_term(self) -> Term {
        match self {
            Value::Int(i) => Term::Int(i),
            Value::Float(f) => Term::Float(f),
        }
    }
}

fn int_overflow() -> Term {
    error::evaluation_error("int_overflow")
}

fn undefined() -> Term {
    error::evaluation_error("undefined")
}

fn zero_divisor() -> Term {
    error::evaluation_error("zero_divisor")
}

fn need_int(v: &Value) -> Result<i64, Term> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Float(f) => Err(error::type_error("integer", Term::Float(*f))),
    }
}

fn finite(f: f64) -> Result<Value, Term> {
    if f.is_finite() {
        Ok(Value::Float(f))
    } else {
        Err(error::evaluation_error("float_overflow"))
    }
}

fn checked(i: Option<i64>) -> Result<Value, Term> {
    i.map(Value::Int).ok_or_else(int_overflow)
}

/// Type promotion: an all-integer application stays exact, otherwise
/// both operands move to float.
fn promote2<R>(
    a: &Value,
    b: &Value,
    fi: impl FnOnce(i64, i64) -> R,
    fd: impl FnOnce(f64, f64) -> R,
) -> R {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => fi(*x, *y),
        (Value::Int(x), Value::Float(y)) => fd(*x as f64, *y),
        (Value::Float(x), Value::Int(y)) => fd(*x, *y as f64),
        (Value::Float(x), Value::Float(y)) => fd(*x, *y),
    }
}

/// Evaluates an arithmetic expression tree left-to-right, depth-first.
pub(crate) fn eval(expr: &Term, env: &Env) -> Result<Value, Term> {
    match env.resolve(expr) {
        Term::Int(i) => Ok(Value::Int(i)),
        Term::Float(f) => Ok(Value::Float(f)),
        Term::Var(_) => Err(error::instantiation_error()),
        Term::Atom(a) => match EVALUABLE.get(format!("{}/0", a).as_str()) {
            Some(f) => f(&[]),
            None => Err(error::type_error(
                "evaluable",
                Indicator::new(a, 0).to_term(),
            )),
        },
        Term::Compound(c) => {
            match EVALUABLE.get(format!("{}/{}", c.functor, c.args.len()).as_str()) {
                Some(f) => {
                    let mut values = Vec::with_capacity(c.args.len());
                    for a in &c.args {
                        values.push(eval(a, env)?);
                    }
                    f(&values)
                }
                None => Err(error::type_error(
                    "evaluable",
                    Indicator::new(c.functor, c.args.len()).to_term(),
                )),
            }
        }
    }
}

pub(crate) fn solve_is(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match eval(&args[1], env) {
        Ok(v) => Promise::unify(m, &args[0], &v.to_term(), k, env),
        Err(ball) => Promise::ball(ball),
    }
}

fn numeric_compare(args: &[Term], env: &Env) -> Result<Ordering, Term> {
    let a = eval(&args[0], env)?;
    let b = eval(&args[1], env)?;
    promote2(
        &a,
        &b,
        |x, y| Ok(x.cmp(&y)),
        |x, y| x.partial_cmp(&y).ok_or_else(undefined),
    )
}

fn compare_test(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
    accept: fn(Ordering) -> bool,
) -> Promise {
    match numeric_compare(args, env) {
        Ok(o) if accept(o) => k(m, env),
        Ok(_) => Promise::Fail,
        Err(ball) => Promise::ball(ball),
    }
}

pub(crate) fn solve_eq(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    compare_test(m, args, k, env, |o| o == Ordering::Equal)
}

pub(crate) fn solve_neq(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    compare_test(m, args, k, env, |o| o != Ordering::Equal)
}

pub(crate) fn solve_lss(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    compare_test(m, args, k, env, |o| o == Ordering::Less)
}

pub(crate) fn solve_leq(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    compare_test(m, args, k, env, |o| o != Ordering::Greater)
}

pub(crate) fn solve_gtr(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    compare_test(m, args, k, env, |o| o == Ordering::Greater)
}

pub(crate) fn solve_geq(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    compare_test(m, args, k, env, |o| o != Ordering::Less)
}

type EvalFn = fn(&[Value]) -> Result<Value, Term>;

fn eval_add(args: &[Value]) -> Result<Value, Term> {
    promote2(
        &args[0],
        &args[1],
        |a, b| checked(a.checked_add(b)),
        |a, b| finite(a + b),
    )
}

fn eval_sub(args: &[Value]) -> Result<Value, Term> {
    promote2(
        &args[0],
        &args[1],
        |a, b| checked(a.checked_sub(b)),
        |a, b| finite(a - b),
    )
}

fn eval_mul(args: &[Value]) -> Result<Value, Term> {
    promote2(
        &args[0],
        &args[1],
        |a, b| checked(a.checked_mul(b)),
        |a, b| finite(a * b),
    )
}

// Integer division by '/' stays an integer when exact, otherwise the
// quotient is a float.
fn eval_div(args: &[Value]) -> Result<Value, Term> {
    promote2(
        &args[0],
        &args[1],
        |a, b| {
            if b == 0 {
                Err(zero_divisor())
            } else if a % b == 0 {
                checked(a.checked_div(b))
            } else {
                finite(a as f64 / b as f64)
            }
        },
        |a, b| {
            if b == 0.0 {
                Err(zero_divisor())
            } else {
                finite(a / b)
            }
        },
    )
}

fn eval_int_div(args: &[Value]) -> Result<Value, Term> {
    let a = need_int(&args[0])?;
    let b = need_int(&args[1])?;
    if b == 0 {
        return Err(zero_divisor());
    }
    checked(a.checked_div(b))
}

fn eval_rem(args: &[Value]) -> Result<Value, Term> {
    let a = need_int(&args[0])?;
    let b = need_int(&args[1])?;
    if b == 0 {
        return Err(zero_divisor());
    }
    checked(a.checked_rem(b))
}

// mod takes the divisor's sign.
fn eval_mod(args: &[Value]) -> Result<Value, Term> {
    let a = need_int(&args[0])?;
    let b = need_int(&args[1])?;
    if b == 0 {
        return Err(zero_divisor());
    }
    let r = a.checked_rem(b).ok_or_else(int_overflow)?;
    Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }))
}

fn eval_neg(args: &[Value]) -> Result<Value, Term> {
    match args[0] {
        Value::Int(i) => checked(i.checked_neg()),
        Value::Float(f) => Ok(Value::Float(-f)),
    }
}

fn eval_plus(args: &[Value]) -> Result<Value, Term> {
    Ok(args[0])
}

fn eval_abs(args: &[Value]) -> Result<Value, Term> {
    match args[0] {
        Value::Int(i) => checked(i.checked_abs()),
        Value::Float(f) => Ok(Value::Float(f.abs())),
    }
}

fn eval_sign(args: &[Value]) -> Result<Value, Term> {
    Ok(match args[0] {
        Value::Int(i) => Value::Int(i.signum()),
        Value::Float(f) => Value::Float(if f == 0.0 { 0.0 } else { f.signum() }),
    })
}

fn eval_min(args: &[Value]) -> Result<Value, Term> {
    let less = promote2(&args[0], &args[1], |a, b| a <= b, |a, b| a <= b);
    Ok(if less { args[0] } else { args[1] })
}

fn eval_max(args: &[Value]) -> Result<Value, Term> {
    let less = promote2(&args[0], &args[1], |a, b| a <= b, |a, b| a <= b);
    Ok(if less { args[1] } else { args[0] })
}

fn as_float(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
    }
}

// ** is the float power.
fn eval_pow(args: &[Value]) -> Result<Value, Term> {
    finite(as_float(&args[0]).powf(as_float(&args[1])))
}

// ^ preserves integers when the exponent is non-negative.
fn eval_int_pow(args: &[Value]) -> Result<Value, Term> {
    match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => {
            if *b >= 0 {
                let e = u32::try_from(*b).map_err(|_| int_overflow())?;
                checked(a.checked_pow(e))
            } else if *a == 0 {
                // 0 has no inverse to raise.
                Err(undefined())
            } else {
                finite((*a as f64).powi(*b as i32))
            }
        }
        _ => eval_pow(args),
    }
}

fn eval_sqrt(args: &[Value]) -> Result<Value, Term> {
    let f = as_float(&args[0]);
    if f < 0.0 {
        return Err(undefined());
    }
    finite(f.sqrt())
}

fn eval_sin(args: &[Value]) -> Result<Value, Term> {
    finite(as_float(&args[0]).sin())
}

fn eval_cos(args: &[Value]) -> Result<Value, Term> {
    finite(as_float(&args[0]).cos())
}

fn eval_atan(args: &[Value]) -> Result<Value, Term> {
    finite(as_float(&args[0]).atan())
}

fn eval_exp(args: &[Value]) -> Result<Value, Term> {
    finite(as_float(&args[0]).exp())
}

fn eval_log(args: &[Value]) -> Result<Value, Term> {
    let f = as_float(&args[0]);
    if f <= 0.0 {
        return Err(undefined());
    }
    finite(f.ln())
}

fn float_to_int(f: f64) -> Result<Value, Term> {
    if f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Ok(Value::Int(f as i64))
    } else {
        Err(int_overflow())
    }
}

fn eval_floor(args: &[Value]) -> Result<Value, Term> {
    match args[0] {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => float_to_int(f.floor()),
    }
}

fn eval_ceiling(args: &[Value]) -> Result<Value, Term> {
    match args[0] {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => float_to_int(f.ceil()),
    }
}

fn eval_round(args: &[Value]) -> Result<Value, Term> {
    match args[0] {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => float_to_int(f.round()),
    }
}

fn eval_truncate(args: &[Value]) -> Result<Value, Term> {
    match args[0] {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => float_to_int(f.trunc()),
    }
}

fn eval_float(args: &[Value]) -> Result<Value, Term> {
    Ok(Value::Float(as_float(&args[0])))
}

fn eval_float_integer_part(args: &[Value]) -> Result<Value, Term> {
    match args[0] {
        Value::Float(f) => Ok(Value::Float(f.trunc())),
        Value::Int(i) => Err(error::type_error("float", Term::Int(i))),
    }
}

fn eval_float_fractional_part(args: &[Value]) -> Result<Value, Term> {
    match args[0] {
        Value::Float(f) => Ok(Value::Float(f.fract())),
        Value::Int(i) => Err(error::type_error("float", Term::Int(i))),
    }
}

fn eval_shl(args: &[Value]) -> Result<Value, Term> {
    let a = need_int(&args[0])?;
    let b = need_int(&args[1])?;
    if b < 0 {
        return Err(undefined());
    }
    if a == 0 {
        return Ok(Value::Int(0));
    }
    if b > 63 {
        return Err(int_overflow());
    }
    let wide = (a as i128) << b;
    i64::try_from(wide).map(Value::Int).map_err(|_| int_overflow())
}

fn eval_shr(args: &[Value]) -> Result<Value, Term> {
    let a = need_int(&args[0])?;
    let b = need_int(&args[1])?;
    if b < 0 {
        return Err(undefined());
    }
    Ok(Value::Int(if b > 63 {
        if a < 0 {
            -1
        } else {
            0
        }
    } else {
        a >> b
    }))
}

fn eval_and(args: &[Value]) -> Result<Value, Term> {
    Ok(Value::Int(need_int(&args[0])? & need_int(&args[1])?))
}

fn eval_or(args: &[Value]) -> Result<Value, Term> {
    Ok(Value::Int(need_int(&args[0])? | need_int(&args[1])?))
}

fn eval_xor(args: &[Value]) -> Result<Value, Term> {
    Ok(Value::Int(need_int(&args[0])? ^ need_int(&args[1])?))
}

fn eval_complement(args: &[Value]) -> Result<Value, Term> {
    Ok(Value::Int(!need_int(&args[0])?))
}

static EVALUABLE: phf::Map<&'static str, EvalFn> = phf_map! {
    "+/2" => eval_add,
    "-/2" => eval_sub,
    "*/2" => eval_mul,
    "//2" => eval_div,
    "///2" => eval_int_div,
    "rem/2" => eval_rem,
    "mod/2" => eval_mod,
    "-/1" => eval_neg,
    "+/1" => eval_plus,
    "abs/1" => eval_abs,
    "sign/1" => eval_sign,
    "min/2" => eval_min,
    "max/2" => eval_max,
    "**/2" => eval_pow,
    "^/2" => eval_int_pow,
    "sqrt/1" => eval_sqrt,
    "sin/1" => eval_sin,
    "cos/1" => eval_cos,
    "atan/1" => eval_atan,
    "exp/1" => eval_exp,
    "log/1" => eval_log,
    "floor/1" => eval_floor,
    "ceiling/1" => eval_ceiling,
    "round/1" => eval_round,
    "truncate/1" => eval_truncate,
    "float/1" => eval_float,
    "float_integer_part/1" => eval_float_integer_part,
    "float_fractional_part/1" => eval_float_fractional_part,
    "<</2" => eval_shl,
    ">>/2" => eval_shr,
    "/\\/2" => eval_and,
    "\\//2" => eval_or,
    "xor/2" => eval_xor,
    "\\/1" => eval_complement,
};
