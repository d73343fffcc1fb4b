//! Static tile grid with terrain and village placement.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NormalParams;
use crate::error::{SimError, SimResult};
use crate::rng::{KeyColumns, RandomStream, StreamKey};

/// Day index used for every draw made while generating the map.
const GENERATION_DAY: i64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Forest,
    HighMountain,
    Desert,
    Sea,
    Grassland,
}

impl Terrain {
    pub const ALL: [Terrain; 5] = [
        Terrain::Forest,
        Terrain::HighMountain,
        Terrain::Desert,
        Terrain::Sea,
        Terrain::Grassland,
    ];
}

/// One value per terrain type.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainTable<T> {
    pub forest: T,
    pub high_mountain: T,
    pub desert: T,
    pub sea: T,
    pub grassland: T,
}

impl<T: Copy> TerrainTable<T> {
    pub fn uniform(value: T) -> Self {
        Self {
            forest: value,
            high_mountain: value,
            desert: value,
            sea: value,
            grassland: value,
        }
    }

    pub fn get(&self, terrain: Terrain) -> T {
        match terrain {
            Terrain::Forest => self.forest,
            Terrain::HighMountain => self.high_mountain,
            Terrain::Desert => self.desert,
            Terrain::Sea => self.sea,
            Terrain::Grassland => self.grassland,
        }
    }
}

impl TerrainTable<f64> {
    fn validate_weights(&self, label: &str) -> SimResult<f64> {
        let mut total = 0.0;
        for terrain in Terrain::ALL {
            let weight = self.get(terrain);
            if !weight.is_finite() || weight < 0.0 {
                return Err(SimError::config(format!(
                    "{label} weight for {terrain:?} must be a non-negative number, got {weight}"
                )));
            }
            total += weight;
        }
        if total <= 0.0 {
            return Err(SimError::config(format!("{label} weights must not all be zero")));
        }
        Ok(total)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainSample {
    pub terrain: Terrain,
    pub elevation: Option<f64>,
}

/// Decides the terrain of a tile from its own stream key.
pub trait TerrainAssigner: Send + Sync {
    fn assign(&self, stream: &RandomStream, tile_key: StreamKey) -> SimResult<TerrainSample>;
}

/// Probability that a village is founded on a tile of the given terrain.
pub trait PlacementProbability: Send + Sync {
    fn probability(&self, terrain: Terrain) -> f64;
}

/// Terrain drawn from fixed categorical weights.
#[derive(Clone, Debug)]
pub struct CategoricalTerrain {
    weights: TerrainTable<f64>,
    total: f64,
}

impl CategoricalTerrain {
    pub fn new(weights: TerrainTable<f64>) -> SimResult<Self> {
        let total = weights.validate_weights("terrain")?;
        Ok(Self { weights, total })
    }

    /// Share of tiles expected to carry `terrain`.
    pub fn share(&self, terrain: Terrain) -> f64 {
        self.weights.get(terrain) / self.total
    }
}

impl TerrainAssigner for CategoricalTerrain {
    fn assign(&self, stream: &RandomStream, tile_key: StreamKey) -> SimResult<TerrainSample> {
        let target = stream.uniform(tile_key.with("terrain"), GENERATION_DAY)? * self.total;
        let mut cumulative = 0.0;
        let mut chosen = Terrain::Grassland;
        for terrain in Terrain::ALL {
            let weight = self.weights.get(terrain);
            if weight <= 0.0 {
                continue;
            }
            chosen = terrain;
            cumulative += weight;
            if target < cumulative {
                break;
            }
        }
        Ok(TerrainSample {
            terrain: chosen,
            elevation: None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct TerrainPlacement {
    probabilities: TerrainTable<f64>,
}

impl TerrainPlacement {
    pub fn new(probabilities: TerrainTable<f64>) -> SimResult<Self> {
        for terrain in Terrain::ALL {
            let p = probabilities.get(terrain);
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::config(format!(
                    "village probability for {terrain:?} must lie in [0, 1], got {p}"
                )));
            }
        }
        Ok(Self { probabilities })
    }

    /// Scales raw terrain weights so the expected village density under the
    /// terrain distribution equals `target`.
    pub fn scaled_to_mean(
        target: f64,
        weights: TerrainTable<f64>,
        terrain: &CategoricalTerrain,
    ) -> SimResult<Self> {
        weights.validate_weights("village")?;
        let expected: f64 = Terrain::ALL
            .iter()
            .map(|t| terrain.share(*t) * weights.get(*t))
            .sum();
        if expected <= 0.0 {
            return Err(SimError::config(
                "village weights are zero on every terrain that can be generated",
            ));
        }
        let factor = target / expected;
        Self::new(TerrainTable {
            forest: weights.forest * factor,
            high_mountain: weights.high_mountain * factor,
            desert: weights.desert * factor,
            sea: weights.sea * factor,
            grassland: weights.grassland * factor,
        })
    }
}

impl PlacementProbability for TerrainPlacement {
    fn probability(&self, terrain: Terrain) -> f64 {
        self.probabilities.get(terrain)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub terrain: Terrain,
    pub elevation: Option<f64>,
    pub arable_land: f64,
    pub has_village: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Map {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl Map {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile(&self, x: u32, y: u32) -> Option<&Tile> {
        if x < self.width && y < self.height {
            self.tiles.get(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn village_tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter().filter(|tile| tile.has_village)
    }
}

pub struct MapGenerator {
    pub terrain: Box<dyn TerrainAssigner>,
    pub placement: Box<dyn PlacementProbability>,
    pub arable_fraction: TerrainTable<NormalParams>,
    pub land_per_tile: f64,
    pub key_columns: KeyColumns,
}

impl MapGenerator {
    pub fn generate(&self, width: u32, height: u32, seed: u64) -> SimResult<Map> {
        if width == 0 || height == 0 {
            return Err(SimError::config(format!(
                "map dimensions must be positive, got {width}x{height}"
            )));
        }
        let count = width.checked_mul(height).ok_or_else(|| {
            SimError::config(format!("map of {width}x{height} tiles is too large"))
        })?;
        let stream = RandomStream::new(seed);
        let mut tiles = Vec::with_capacity(count as usize);
        for y in 0..height {
            for x in 0..width {
                tiles.push(self.generate_tile(&stream, x, y)?);
            }
        }
        let map = Map {
            width,
            height,
            tiles,
        };
        debug!(
            width,
            height,
            villages = map.village_tiles().count(),
            "generated map"
        );
        Ok(map)
    }

    fn generate_tile(&self, stream: &RandomStream, x: u32, y: u32) -> SimResult<Tile> {
        let key = StreamKey::new("map").with_tile(&self.key_columns, x, y);
        let sample = self.terrain.assign(stream, key)?;

        let p = self.placement.probability(sample.terrain);
        let has_village = stream.chance(key.with("village"), GENERATION_DAY, p)?;

        let arable = self.arable_fraction.get(sample.terrain);
        let fraction = stream
            .normal(key.with("arable_land"), GENERATION_DAY, arable.loc, arable.scale)?
            .clamp(0.0, 1.0);

        Ok(Tile {
            x,
            y,
            terrain: sample.terrain,
            elevation: sample.elevation,
            arable_land: fraction * self.land_per_tile,
            has_village,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;

    fn generator() -> MapGenerator {
        MapConfig::default()
            .generator(KeyColumns::default())
            .expect("default map config is valid")
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generator().generate(8, 5, 17).unwrap();
        let b = generator().generate(8, 5, 17).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, generator().generate(8, 5, 18).unwrap());
    }

    #[test]
    fn test_oversized_map_is_rejected() {
        let err = generator().generate(u32::MAX, 2, 1).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn test_every_coordinate_has_one_tile() {
        let map = generator().generate(6, 4, 3).unwrap();
        assert_eq!(map.tiles().len(), 24);
        for y in 0..4 {
            for x in 0..6 {
                let tile = map.tile(x, y).unwrap();
                assert_eq!((tile.x, tile.y), (x, y));
                assert!(tile.arable_land >= 0.0);
            }
        }
        assert!(map.tile(6, 0).is_none());
    }

    #[test]
    fn test_tiles_do_not_depend_on_map_size() {
        let small = generator().generate(3, 3, 99).unwrap();
        let large = generator().generate(12, 9, 99).unwrap();
        for tile in small.tiles() {
            assert_eq!(Some(tile), large.tile(tile.x, tile.y));
        }
    }

    #[test]
    fn test_zero_probability_terrain_never_hosts_villages() {
        let terrain = CategoricalTerrain::new(TerrainTable {
            forest: 0.0,
            high_mountain: 0.0,
            desert: 0.0,
            sea: 1.0,
            grassland: 0.0,
        })
        .unwrap();
        let placement = TerrainPlacement::new(TerrainTable {
            sea: 0.0,
            ..TerrainTable::uniform(1.0)
        })
        .unwrap();
        let mut generator = generator();
        generator.terrain = Box::new(terrain);
        generator.placement = Box::new(placement);
        let map = generator.generate(10, 10, 1).unwrap();
        assert!(map.tiles().iter().all(|t| t.terrain == Terrain::Sea));
        assert_eq!(map.village_tiles().count(), 0);
    }

    #[test]
    fn test_scaled_placement_hits_target_mean() {
        let terrain = CategoricalTerrain::new(TerrainTable::uniform(1.0)).unwrap();
        let placement = TerrainPlacement::scaled_to_mean(
            0.2,
            TerrainTable {
                forest: 1.0,
                high_mountain: 1.0,
                desert: 1.0,
                sea: 0.0,
                grassland: 2.0,
            },
            &terrain,
        )
        .unwrap();
        let mean: f64 = Terrain::ALL
            .iter()
            .map(|t| terrain.share(*t) * placement.probability(*t))
            .sum();
        assert!((mean - 0.2).abs() < 1e-12);
        assert_eq!(placement.probability(Terrain::Sea), 0.0);
    }

    #[test]
    fn test_scaled_placement_above_one_is_rejected() {
        let terrain = CategoricalTerrain::new(TerrainTable {
            grassland: 100.0,
            ..TerrainTable::uniform(1.0)
        })
        .unwrap();
        let weights = TerrainTable {
            forest: 50.0,
            ..TerrainTable::uniform(0.01)
        };
        let err = TerrainPlacement::scaled_to_mean(0.5, weights, &terrain).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }
}
