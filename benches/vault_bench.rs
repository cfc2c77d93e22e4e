use criterion::{criterion_group, criterion_main, Criterion};
use databank::{
  bank::DataBank,
  data::{flags::ItemFlags, value::DataType},
  option::Options,
  util::rand_kv::{get_test_key, get_test_value},
};
use rand::Rng;
use std::path::PathBuf;

const KEY_COUNT: usize = 10000;

fn open_bank(name: &str) -> (DataBank, PathBuf) {
  let mut option = Options::default();
  option.dir_path = PathBuf::from("/tmp/databank-bench").join(name);
  if !option.dir_path.is_dir() {
    std::fs::create_dir_all(&option.dir_path).unwrap();
  }
  let dir = option.dir_path.clone();
  (DataBank::open(option).unwrap(), dir)
}

fn fill(bank: &DataBank, flags: ItemFlags) {
  let vault = bank.open_vault("bench").unwrap();
  let batch = (0..KEY_COUNT)
    .map(|i| (get_test_key(i), Some(get_test_value(i))))
    .collect();
  vault.set_values(batch, flags).unwrap();
}

fn bench_set(c: &mut Criterion) {
  let (bank, dir) = open_bank("set-bench");
  let mut rnd = rand::rng();

  c.bench_function("databank-set-bench", |b| {
    b.iter(|| {
      let i = rnd.random_range(0..KEY_COUNT);
      let res = bank.set(Some("bench"), &get_test_key(i), get_test_value(i), ItemFlags::empty());
      assert!(res.is_ok());
    })
  });

  drop(bank);
  std::fs::remove_dir_all(dir).unwrap();
}

fn bench_get(c: &mut Criterion) {
  let (bank, dir) = open_bank("get-bench");
  fill(&bank, ItemFlags::empty());
  let mut rnd = rand::rng();

  c.bench_function("databank-get-bench", |b| {
    b.iter(|| {
      let i = rnd.random_range(0..KEY_COUNT * 2);
      let res = bank.get(Some("bench"), &get_test_key(i), DataType::Auto);
      assert_eq!(res.is_ok(), i < KEY_COUNT);
    })
  });

  drop(bank);
  std::fs::remove_dir_all(dir).unwrap();
}

fn bench_persist(c: &mut Criterion) {
  let (bank, dir) = open_bank("persist-bench");
  fill(&bank, ItemFlags::PERSIST);
  let mut rnd = rand::rng();

  c.bench_function("databank-persist-bench", |b| {
    b.iter(|| {
      let i = rnd.random_range(0..KEY_COUNT);
      let res = bank.set(Some("bench"), &get_test_key(i), get_test_value(i), ItemFlags::PERSIST);
      assert!(res.is_ok());
    })
  });

  drop(bank);
  std::fs::remove_dir_all(dir).unwrap();
}

fn bench_enumerate(c: &mut Criterion) {
  let (bank, dir) = open_bank("enumerate-bench");
  fill(&bank, ItemFlags::empty());

  c.bench_function("databank-enumerate-bench", |b| {
    b.iter(|| {
      let res = bank.get(Some("bench"), "/databank/test/key_00000*", DataType::Auto);
      assert!(res.is_ok());
    })
  });

  drop(bank);
  std::fs::remove_dir_all(dir).unwrap();
}

fn bench_reload(c: &mut Criterion) {
  let (bank, dir) = open_bank("reload-bench");
  fill(&bank, ItemFlags::PERSIST);
  drop(bank);

  c.bench_function("databank-reload-bench", |b| {
    b.iter(|| {
      let (bank, _) = open_bank("reload-bench");
      assert_eq!(bank.get_vault("bench").unwrap().len(), KEY_COUNT);
    })
  });

  std::fs::remove_dir_all(dir).unwrap();
}

criterion_group!(
  benches,
  bench_get,
  bench_set,
  bench_persist,
  bench_enumerate,
  bench_reload
);
criterion_main!(benches);
