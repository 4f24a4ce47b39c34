use rand::Rng;
use uuid::Uuid;

/// Deterministic v4-format UUID drawn from the encounter's seeded RNG.
pub fn generate_uuid(rng: &mut impl Rng) -> Uuid {
    let bytes: [u8; 16] = rng.gen();
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// `encounter_<uuid>`, stable for a given seed.
pub fn encounter_id(rng: &mut impl Rng) -> String {
    format!("encounter_{}", generate_uuid(rng).simple())
}
