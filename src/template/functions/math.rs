use minijinja::{Environment, Error};
use rand::Rng;

use super::{invalid, number};

pub(super) fn register(env: &mut Environment<'static>) {
    env.add_function("add", |a: f64, b: f64| number(a + b));
    env.add_function("sub", |a: f64, b: f64| number(a - b));
    env.add_function("mul", |a: f64, b: f64| number(a * b));
    env.add_function("div", |a: f64, b: f64| number(div(a, b)));
    env.add_function("mod", |a: f64, b: f64| number(modulo(a, b)));
    env.add_function("ceil", |x: f64| number(x.ceil()));
    env.add_function("floor", |x: f64| number(x.floor()));
    env.add_function("round", |x: f64| number(x.round()));
    env.add_function("max", |a: f64, b: f64| number(a.max(b)));
    env.add_function("min", |a: f64, b: f64| number(a.min(b)));
    env.add_function("abs", |x: f64| number(x.abs()));
    env.add_function("pow", |x: f64, y: f64| number(x.powf(y)));
    env.add_function("sqrt", |x: f64| number(x.sqrt()));
    env.add_function("rand", || rand::thread_rng().r#gen::<f64>());
    env.add_function("randInt", |min: i64, max: i64| rand_int(min, max));
}

/// Division by zero yields zero.
pub(crate) fn div(a: f64, b: f64) -> f64 {
    if b == 0.0 { 0.0 } else { a / b }
}

/// Floating remainder with the sign of the dividend; a zero divisor yields
/// zero, like [`div`].
pub(crate) fn modulo(a: f64, b: f64) -> f64 {
    if b == 0.0 { 0.0 } else { a % b }
}

/// Uniform integer in `[min, max)`.
pub(crate) fn rand_int(min: i64, max: i64) -> Result<i64, Error> {
    if max <= min {
        return Err(invalid(format!("randInt: max ({max}) must be greater than min ({min})")));
    }
    Ok(rand::thread_rng().gen_range(min..max))
}
