use rand::{distr::Alphanumeric, Rng};

use crate::data::value::Value;

pub fn get_test_key(i: usize) -> String {
  format!("/databank/test/key_{:09}", i)
}

pub fn get_test_value(i: usize) -> Value {
  let suffix: String = rand::rng()
    .sample_iter(&Alphanumeric)
    .take(16)
    .map(char::from)
    .collect();
  Value::string(&format!("databank-value-{:09}-{}", i, suffix))
}
