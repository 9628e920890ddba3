//! Synthetic laptop generation for tests and demo clients.

use crate::pb::{
    keyboard::Layout, laptop::Weight, memory::Unit, screen::Panel, screen::Resolution,
    storage::Driver, Cpu, Gpu, Keyboard, Laptop, Memory, Screen, Storage,
};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

pub fn new_keyboard() -> Keyboard {
    let mut rng = rand::thread_rng();
    let layout = *[Layout::Qwerty, Layout::Qwertz, Layout::Azerty]
        .choose(&mut rng)
        .unwrap_or(&Layout::Qwerty);

    Keyboard {
        layout: layout as i32,
        backlit: rng.gen_bool(0.5),
    }
}

pub fn new_cpu() -> Cpu {
    let mut rng = rand::thread_rng();
    let brand = pick(&["Intel", "AMD"]);
    let name = match brand {
        "Intel" => pick(&[
            "Xeon E-2286M",
            "Core i9-9980HK",
            "Core i7-9750H",
            "Core i5-9400F",
            "Core i3-1005G1",
        ]),
        _ => pick(&["Ryzen 7 PRO 2700U", "Ryzen 5 PRO 3500U", "Ryzen 3 PRO 3200GE"]),
    };

    let number_cores = rng.gen_range(2..=8);
    let number_threads = rng.gen_range(number_cores..=12);
    let min_ghz = rng.gen_range(2.0..3.5);
    let max_ghz = rng.gen_range(min_ghz..5.0);

    Cpu {
        brand: brand.to_string(),
        name: name.to_string(),
        number_cores,
        number_threads,
        min_ghz,
        max_ghz,
    }
}

pub fn new_gpu() -> Gpu {
    let mut rng = rand::thread_rng();
    let brand = pick(&["Nvidia", "AMD"]);
    let name = match brand {
        "Nvidia" => pick(&["RTX 2060", "RTX 2070", "GTX 1660-Ti", "GTX 1070"]),
        _ => pick(&["RX 590", "RX 580", "RX 5700-XT", "RX Vega-56"]),
    };

    let min_ghz = rng.gen_range(1.0..1.5);
    let max_ghz = rng.gen_range(min_ghz..2.0);

    Gpu {
        brand: brand.to_string(),
        name: name.to_string(),
        min_ghz,
        max_ghz,
        memory: Some(Memory::new(rng.gen_range(2..=6), Unit::Gigabyte)),
    }
}

pub fn new_ram() -> Memory {
    Memory::new(rand::thread_rng().gen_range(4..=64), Unit::Gigabyte)
}

pub fn new_ssd() -> Storage {
    Storage {
        driver: Driver::Ssd as i32,
        memory: Some(Memory::new(
            rand::thread_rng().gen_range(128..=1024),
            Unit::Gigabyte,
        )),
    }
}

pub fn new_hdd() -> Storage {
    Storage {
        driver: Driver::Hdd as i32,
        memory: Some(Memory::new(rand::thread_rng().gen_range(1..=6), Unit::Terabyte)),
    }
}

pub fn new_screen() -> Screen {
    let mut rng = rand::thread_rng();
    let height = rng.gen_range(1080..=4320);
    let panel = *[Panel::Ips, Panel::Oled]
        .choose(&mut rng)
        .unwrap_or(&Panel::Ips);

    Screen {
        size_inch: rng.gen_range(13.0..17.0),
        resolution: Some(Resolution {
            width: height * 16 / 9,
            height,
        }),
        panel: panel as i32,
        multitouch: rng.gen_bool(0.5),
    }
}

/// A random but valid laptop with a fresh UUID.
pub fn new_laptop() -> Laptop {
    let mut rng = rand::thread_rng();
    let brand = pick(&["Apple", "Dell", "Lenovo"]);
    let name = match brand {
        "Apple" => pick(&["Macbook Air", "Macbook Pro"]),
        "Dell" => pick(&["Latitude", "Vostro", "XPS", "Alienware"]),
        _ => pick(&["Thinkpad X1", "Thinkpad P1", "Thinkpad P53"]),
    };

    let now = Utc::now();

    Laptop {
        id: Uuid::new_v4().to_string(),
        brand: brand.to_string(),
        name: name.to_string(),
        cpu: Some(new_cpu()),
        ram: Some(new_ram()),
        gpus: vec![new_gpu()],
        storages: vec![new_ssd(), new_hdd()],
        screen: Some(new_screen()),
        keyboard: Some(new_keyboard()),
        weight: Some(Weight::WeightKg(rng.gen_range(1.0..3.0))),
        price_usd: rng.gen_range(1500.0..3000.0),
        release_year: rng.gen_range(2015..=2019),
        updated_at: Some(prost_types::Timestamp {
            seconds: now.timestamp(),
            nanos: now.timestamp_subsec_nanos() as i32,
        }),
    }
}

/// A random rating score between 1 and 10.
pub fn random_score() -> f64 {
    f64::from(rand::thread_rng().gen_range(1u32..=10))
}

fn pick(values: &[&'static str]) -> &'static str {
    values.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_laptop_is_valid() {
        let laptop = new_laptop();

        assert!(Uuid::parse_str(&laptop.id).is_ok());
        assert!(!laptop.brand.is_empty());

        let cpu = laptop.cpu.unwrap();
        assert!((2..=8).contains(&cpu.number_cores));
        assert!(cpu.number_threads >= cpu.number_cores);
        assert!(cpu.max_ghz >= cpu.min_ghz);

        assert!((1500.0..3000.0).contains(&laptop.price_usd));
        assert_eq!(laptop.storages.len(), 2);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(new_laptop().id, new_laptop().id);
    }

    #[test]
    fn test_score_range() {
        for _ in 0..100 {
            assert!((1.0..=10.0).contains(&random_score()));
        }
    }
}
