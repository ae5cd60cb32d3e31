use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;
use std::path::Path;
use std::sync::Arc;
use strum_macros::{EnumString, VariantNames};

pub type RegionId = usize; // Index into World.regions
pub type EntranceId = usize; // Index into World.entrances
pub type LocationId = usize; // Index into World.locations
pub type DungeonId = usize; // Index into World.dungeons
pub type PlayerId = usize; // Owning player of an item; always 1 for a single-world generation

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumString, VariantNames, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemClassification {
    // Can change which locations are reachable:
    Advancement,
    // Never gates reachability, but must not be treated as disposable filler:
    Priority,
    Filler,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumString, VariantNames, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemType {
    SmallKey,
    BigKey,
    Map,
    Compass,
    Crystal,
    Event,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub classification: ItemClassification,
    pub item_type: Option<ItemType>,
    pub code: Option<u32>,
    pub dungeon: Option<DungeonId>, // Set for keys/maps/compasses that belong to a dungeon
    pub player: PlayerId,
}

impl Item {
    pub fn is_advancement(&self) -> bool {
        self.classification == ItemClassification::Advancement
    }

    pub fn is_priority(&self) -> bool {
        self.classification == ItemClassification::Priority
    }

    pub fn is_key(&self) -> bool {
        matches!(self.item_type, Some(ItemType::SmallKey | ItemType::BigKey))
    }

    pub fn is_event(&self) -> bool {
        self.item_type == Some(ItemType::Event)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    pub classification: ItemClassification,
    pub item_type: Option<ItemType>,
    pub code: Option<u32>,
}

/// Read-only view of collected progress, as seen by access predicates.
pub trait LogicView {
    fn item_count(&self, name: &str) -> usize;

    fn has(&self, name: &str) -> bool {
        self.item_count(name) > 0
    }

    fn can_reach_region(&self, region_id: RegionId) -> bool;
}

/// Access predicate gating a location or entrance. Implementations must be pure and
/// monotone: if satisfied for some collected state, they stay satisfied for any superset.
pub trait Predicate: Send + Sync {
    fn evaluate(&self, state: &dyn LogicView) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&dyn LogicView) -> bool + Send + Sync,
{
    fn evaluate(&self, state: &dyn LogicView) -> bool {
        self(state)
    }
}

#[derive(Clone)]
pub struct Access(Arc<dyn Predicate>);

impl Access {
    pub fn new<P: Predicate + 'static>(predicate: P) -> Self {
        Access(Arc::new(predicate))
    }

    pub fn free() -> Self {
        Access::new(Rule::Free)
    }

    pub fn evaluate(&self, state: &dyn LogicView) -> bool {
        self.0.evaluate(state)
    }
}

impl Debug for Access {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Access(..)")
    }
}

impl From<Rule> for Access {
    fn from(rule: Rule) -> Self {
        Access::new(rule)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Rule {
    Free,
    Never,
    Item { name: String, count: usize },
    Region(RegionId),
    And(Vec<Rule>),
    Or(Vec<Rule>),
}

impl Rule {
    pub fn has(name: &str) -> Rule {
        Rule::has_count(name, 1)
    }

    pub fn has_count(name: &str, count: usize) -> Rule {
        if count == 0 {
            return Rule::Free;
        }
        Rule::Item {
            name: name.to_string(),
            count,
        }
    }

    pub fn make_and(rules: Vec<Rule>) -> Rule {
        let mut out_rules: Vec<Rule> = vec![];
        for rule in rules {
            if let Rule::Never = rule {
                return Rule::Never;
            } else if let Rule::Free = rule {
                continue;
            } else if let Rule::And(and_rules) = rule {
                out_rules.extend(and_rules);
            } else {
                out_rules.push(rule);
            }
        }
        match out_rules.len() {
            0 => Rule::Free,
            1 => out_rules.swap_remove(0),
            _ => Rule::And(out_rules),
        }
    }

    pub fn make_or(rules: Vec<Rule>) -> Rule {
        let mut out_rules: Vec<Rule> = vec![];
        for rule in rules {
            if let Rule::Never = rule {
                continue;
            } else if let Rule::Free = rule {
                return Rule::Free;
            } else if let Rule::Or(or_rules) = rule {
                out_rules.extend(or_rules);
            } else {
                out_rules.push(rule);
            }
        }
        match out_rules.len() {
            0 => Rule::Never,
            1 => out_rules.swap_remove(0),
            _ => Rule::Or(out_rules),
        }
    }
}

impl Predicate for Rule {
    fn evaluate(&self, state: &dyn LogicView) -> bool {
        match self {
            Rule::Free => true,
            Rule::Never => false,
            Rule::Item { name, count } => state.item_count(name) >= *count,
            Rule::Region(region_id) => state.can_reach_region(*region_id),
            Rule::And(rules) => rules.iter().all(|r| r.evaluate(state)),
            Rule::Or(rules) => rules.iter().any(|r| r.evaluate(state)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDef {
    #[default]
    Free,
    Never,
    Has(String),
    HasCount {
        item: String,
        count: usize,
    },
    CanReach(String), // Region name
    And(Vec<RuleDef>),
    Or(Vec<RuleDef>),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRule {
    #[default]
    Any,
    Only(Vec<String>),
    Forbid(Vec<String>),
}

impl ItemRule {
    pub fn allows(&self, item: &Item) -> bool {
        match self {
            ItemRule::Any => true,
            ItemRule::Only(names) => names.contains(&item.name),
            ItemRule::Forbid(names) => !names.contains(&item.name),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Region {
    pub name: String,
    pub dungeon: Option<DungeonId>,
    pub entrances: Vec<EntranceId>, // Entrances leading into this region
    pub exits: Vec<EntranceId>,     // Entrances leading out of this region
    pub locations: Vec<LocationId>,
}

#[derive(Clone, Debug)]
pub struct Entrance {
    pub name: String,
    pub from: RegionId,
    pub to: RegionId,
    pub access: Access,
}

#[derive(Clone, Debug)]
pub struct Location {
    pub name: String,
    pub region: RegionId,
    pub access: Access,
    pub item_rule: ItemRule,
    pub item: Option<Item>,
    pub event: bool, // Pre-filled before general filling; excluded from the item pool bookkeeping
}

#[derive(Clone, Debug)]
pub struct Dungeon {
    pub name: String,
    pub regions: Vec<RegionId>,
    pub big_key: Option<Item>,
    pub small_keys: Vec<Item>,
    pub dungeon_items: Vec<Item>, // Maps, compasses, ...
}

impl Dungeon {
    pub fn all_items(&self) -> impl Iterator<Item = &Item> {
        self.big_key
            .iter()
            .chain(self.small_keys.iter())
            .chain(self.dungeon_items.iter())
    }

    // Removes and returns every item belonging to the dungeon (used when they join the main pool).
    pub fn take_items(&mut self) -> Vec<Item> {
        let mut out: Vec<Item> = self.big_key.take().into_iter().collect();
        out.append(&mut self.small_keys);
        out.append(&mut self.dungeon_items);
        out
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntranceDef {
    pub name: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub rule: RuleDef,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationDef {
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub rule: RuleDef,
    #[serde(default)]
    pub item_rule: ItemRule,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemDef {
    pub name: String,
    pub classification: ItemClassification,
    #[serde(default, rename = "type")]
    pub item_type: Option<ItemType>,
    #[serde(default)]
    pub code: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemCount {
    pub name: String,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventDef {
    pub location: String,
    pub item: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressiveDef {
    pub name: String,
    pub tiers: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectLimitDef {
    pub name: String,
    pub limit: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DungeonDef {
    pub name: String,
    pub regions: Vec<String>,
    #[serde(default)]
    pub big_key: Option<String>,
    #[serde(default)]
    pub small_keys: Vec<String>,
    #[serde(default)]
    pub dungeon_items: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PrizeDef {
    pub locations: Vec<String>,
    pub items: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldDef {
    pub name: String,
    pub start_region: String,
    pub regions: Vec<String>,
    #[serde(default)]
    pub entrances: Vec<EntranceDef>,
    pub locations: Vec<LocationDef>,
    pub items: Vec<ItemDef>,
    #[serde(default)]
    pub item_pool: Vec<ItemCount>,
    #[serde(default)]
    pub precollected: Vec<String>,
    #[serde(default)]
    pub events: Vec<EventDef>,
    #[serde(default)]
    pub progressive: Vec<ProgressiveDef>,
    #[serde(default)]
    pub collect_limits: Vec<CollectLimitDef>,
    #[serde(default)]
    pub dungeons: Vec<DungeonDef>,
    #[serde(default)]
    pub prizes: PrizeDef,
    #[serde(default)]
    pub trash_regions: Vec<String>,
    pub goal: RuleDef,
}

#[derive(Clone, Debug)]
pub struct World {
    pub name: String,
    pub start_region: RegionId,
    pub regions: Vec<Region>,
    pub entrances: Vec<Entrance>,
    pub locations: Vec<Location>,
    pub dungeons: Vec<Dungeon>,
    pub item_table: HashMap<String, ItemData>,
    pub itempool: Vec<Item>, // Items not yet placed
    pub precollected: Vec<Item>,
    pub progressive: HashMap<String, Vec<String>>, // Progressive item name -> tiers, lowest first
    pub collect_limits: HashMap<String, usize>,
    pub prize_locations: Vec<LocationId>,
    pub prize_items: Vec<Item>,
    pub trash_regions: Vec<RegionId>,
    pub goal: Access,
    pub keysanity: bool, // If true, dungeon items may be placed anywhere
    pub region_isv: IndexedVec<String>,
    pub location_isv: IndexedVec<String>,
    dungeon_by_item: HashMap<String, DungeonId>,
}

fn compile_rule(rule: &RuleDef, region_isv: &IndexedVec<String>) -> Result<Rule> {
    Ok(match rule {
        RuleDef::Free => Rule::Free,
        RuleDef::Never => Rule::Never,
        RuleDef::Has(name) => Rule::has(name),
        RuleDef::HasCount { item, count } => Rule::has_count(item, *count),
        RuleDef::CanReach(region_name) => match region_isv.index_by_key.get(region_name) {
            Some(&region_id) => Rule::Region(region_id),
            None => bail!("Unknown region in rule: {}", region_name),
        },
        RuleDef::And(rules) => Rule::make_and(
            rules
                .iter()
                .map(|r| compile_rule(r, region_isv))
                .collect::<Result<Vec<Rule>>>()?,
        ),
        RuleDef::Or(rules) => Rule::make_or(
            rules
                .iter()
                .map(|r| compile_rule(r, region_isv))
                .collect::<Result<Vec<Rule>>>()?,
        ),
    })
}

impl World {
    pub fn load(path: &Path) -> Result<World> {
        let world_str = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read world file at {}", path.display()))?;
        let world_def: WorldDef = serde_json::from_str(&world_str)
            .with_context(|| format!("Unable to parse world file at {}", path.display()))?;
        let world = World::from_def(&world_def)?;
        info!(
            "Loaded world '{}': {} regions, {} locations, {} items in pool",
            world.name,
            world.regions.len(),
            world.locations.len(),
            world.itempool.len()
        );
        Ok(world)
    }

    pub fn from_def(def: &WorldDef) -> Result<World> {
        let mut region_isv: IndexedVec<String> = IndexedVec::default();
        for name in &def.regions {
            if region_isv.index_by_key.contains_key(name) {
                bail!("Duplicate region: {}", name);
            }
            region_isv.add(name);
        }
        let start_region = *region_isv
            .index_by_key
            .get(&def.start_region)
            .with_context(|| format!("Unknown start region: {}", def.start_region))?;

        let mut item_table: HashMap<String, ItemData> = HashMap::new();
        for item_def in &def.items {
            let data = ItemData {
                classification: item_def.classification,
                item_type: item_def.item_type,
                code: item_def.code,
            };
            if item_table.insert(item_def.name.clone(), data).is_some() {
                bail!("Duplicate item in item table: {}", item_def.name);
            }
        }

        let mut regions: Vec<Region> = region_isv
            .keys
            .iter()
            .map(|name| Region {
                name: name.clone(),
                dungeon: None,
                entrances: vec![],
                exits: vec![],
                locations: vec![],
            })
            .collect();

        let mut dungeon_by_item: HashMap<String, DungeonId> = HashMap::new();
        for (dungeon_id, dungeon_def) in def.dungeons.iter().enumerate() {
            for region_name in &dungeon_def.regions {
                let region_id = *region_isv
                    .index_by_key
                    .get(region_name)
                    .with_context(|| {
                        format!("Unknown region {} in dungeon {}", region_name, dungeon_def.name)
                    })?;
                regions[region_id].dungeon = Some(dungeon_id);
            }
            for name in dungeon_def
                .big_key
                .iter()
                .chain(dungeon_def.small_keys.iter())
                .chain(dungeon_def.dungeon_items.iter())
            {
                dungeon_by_item.insert(name.clone(), dungeon_id);
            }
        }

        let mut world = World {
            name: def.name.clone(),
            start_region,
            regions,
            entrances: vec![],
            locations: vec![],
            dungeons: vec![],
            item_table,
            itempool: vec![],
            precollected: vec![],
            progressive: HashMap::new(),
            collect_limits: HashMap::new(),
            prize_locations: vec![],
            prize_items: vec![],
            trash_regions: vec![],
            goal: Access::new(compile_rule(&def.goal, &region_isv)?),
            keysanity: false,
            region_isv,
            location_isv: IndexedVec::default(),
            dungeon_by_item,
        };

        for dungeon_def in &def.dungeons {
            let dungeon = Dungeon {
                name: dungeon_def.name.clone(),
                regions: dungeon_def
                    .regions
                    .iter()
                    .map(|r| world.get_region_id(r))
                    .collect::<Result<Vec<RegionId>>>()?,
                big_key: match &dungeon_def.big_key {
                    Some(name) => Some(world.create_item(name)?),
                    None => None,
                },
                small_keys: dungeon_def
                    .small_keys
                    .iter()
                    .map(|name| world.create_item(name))
                    .collect::<Result<Vec<Item>>>()?,
                dungeon_items: dungeon_def
                    .dungeon_items
                    .iter()
                    .map(|name| world.create_item(name))
                    .collect::<Result<Vec<Item>>>()?,
            };
            world.dungeons.push(dungeon);
        }

        for entrance_def in &def.entrances {
            let from = world.get_region_id(&entrance_def.from)?;
            let to = world.get_region_id(&entrance_def.to)?;
            let rule = compile_rule(&entrance_def.rule, &world.region_isv)
                .with_context(|| format!("In entrance {}", entrance_def.name))?;
            let entrance_id = world.entrances.len();
            world.entrances.push(Entrance {
                name: entrance_def.name.clone(),
                from,
                to,
                access: Access::new(rule),
            });
            world.regions[from].exits.push(entrance_id);
            world.regions[to].entrances.push(entrance_id);
        }

        for location_def in &def.locations {
            if world.location_isv.index_by_key.contains_key(&location_def.name) {
                bail!("Duplicate location: {}", location_def.name);
            }
            let region = world.get_region_id(&location_def.region)?;
            let rule = compile_rule(&location_def.rule, &world.region_isv)
                .with_context(|| format!("In location {}", location_def.name))?;
            let location_id = world.location_isv.add(&location_def.name);
            world.locations.push(Location {
                name: location_def.name.clone(),
                region,
                access: Access::new(rule),
                item_rule: location_def.item_rule.clone(),
                item: None,
                event: false,
            });
            world.regions[region].locations.push(location_id);
        }

        for event_def in &def.events {
            let location_id = world.get_location_id(&event_def.location)?;
            let item = world.create_item(&event_def.item)?;
            world.push_item(location_id, item);
            world.locations[location_id].event = true;
        }

        for item_count in &def.item_pool {
            for _ in 0..item_count.count {
                let item = world.create_item(&item_count.name)?;
                world.itempool.push(item);
            }
        }
        for name in &def.precollected {
            let item = world.create_item(name)?;
            world.precollected.push(item);
        }
        for progressive_def in &def.progressive {
            if progressive_def.tiers.is_empty() {
                bail!("Progressive item {} has no tiers", progressive_def.name);
            }
            world
                .progressive
                .insert(progressive_def.name.clone(), progressive_def.tiers.clone());
        }
        for limit_def in &def.collect_limits {
            world
                .collect_limits
                .insert(limit_def.name.clone(), limit_def.limit);
        }

        if def.prizes.locations.len() != def.prizes.items.len() {
            bail!(
                "Prize stage has {} locations but {} items",
                def.prizes.locations.len(),
                def.prizes.items.len()
            );
        }
        for name in &def.prizes.locations {
            let location_id = world.get_location_id(name)?;
            world.prize_locations.push(location_id);
        }
        for name in &def.prizes.items {
            let item = world.create_item(name)?;
            world.prize_items.push(item);
        }
        for name in &def.trash_regions {
            let region_id = world.get_region_id(name)?;
            world.trash_regions.push(region_id);
        }

        Ok(world)
    }

    pub fn create_item(&self, name: &str) -> Result<Item> {
        let data = self
            .item_table
            .get(name)
            .with_context(|| format!("Unknown item: {}", name))?;
        Ok(Item {
            name: name.to_string(),
            classification: data.classification,
            item_type: data.item_type,
            code: data.code,
            dungeon: self.dungeon_by_item.get(name).copied(),
            player: 1,
        })
    }

    pub fn get_region_id(&self, name: &str) -> Result<RegionId> {
        self.region_isv
            .index_by_key
            .get(name)
            .copied()
            .with_context(|| format!("Unknown region: {}", name))
    }

    pub fn get_location_id(&self, name: &str) -> Result<LocationId> {
        self.location_isv
            .index_by_key
            .get(name)
            .copied()
            .with_context(|| format!("Unknown location: {}", name))
    }

    pub fn location_dungeon(&self, location_id: LocationId) -> Option<DungeonId> {
        self.regions[self.locations[location_id].region].dungeon
    }

    pub fn push_item(&mut self, location_id: LocationId, item: Item) {
        self.locations[location_id].item = Some(item);
    }

    // Keys count as progression once they are shuffled like any other item.
    pub fn is_progression(&self, item: &Item) -> bool {
        item.is_advancement() || (self.keysanity && item.is_key())
    }

    // Static part of the "can this item go here" check; reachability is the caller's concern.
    pub fn item_allowed(&self, location_id: LocationId, item: &Item) -> bool {
        if !self.locations[location_id].item_rule.allows(item) {
            return false;
        }
        match item.dungeon {
            Some(dungeon_id) if !self.keysanity => {
                self.location_dungeon(location_id) == Some(dungeon_id)
            }
            _ => true,
        }
    }

    pub fn unfilled_locations(&self) -> Vec<LocationId> {
        self.locations
            .iter()
            .enumerate()
            .filter(|(_, loc)| loc.item.is_none() && !loc.event)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn filled_locations(&self) -> Vec<LocationId> {
        self.locations
            .iter()
            .enumerate()
            .filter(|(_, loc)| loc.item.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn location_names(&self, location_ids: &[LocationId]) -> Vec<String> {
        location_ids
            .iter()
            .map(|&i| self.locations[i].name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashSet;

    struct TestView {
        items: HashMap<String, usize>,
        regions: HashSet<RegionId>,
    }

    impl LogicView for TestView {
        fn item_count(&self, name: &str) -> usize {
            self.items.get(name).copied().unwrap_or(0)
        }

        fn can_reach_region(&self, region_id: RegionId) -> bool {
            self.regions.contains(&region_id)
        }
    }

    fn sample_def() -> WorldDef {
        serde_json::from_value(serde_json::json!({
            "name": "sample",
            "start_region": "Menu",
            "regions": ["Menu", "Field", "Dungeon"],
            "entrances": [
                {"name": "Menu -> Field", "from": "Menu", "to": "Field"},
                {"name": "Field -> Dungeon", "from": "Field", "to": "Dungeon", "rule": {"has": "Lamp"}}
            ],
            "locations": [
                {"name": "Chest", "region": "Field"},
                {"name": "Dungeon Chest", "region": "Dungeon"},
                {"name": "Boss", "region": "Dungeon", "rule": {"has": "Small Key"}}
            ],
            "items": [
                {"name": "Lamp", "classification": "advancement", "code": 18},
                {"name": "Small Key", "classification": "filler", "type": "small_key"},
                {"name": "Victory", "classification": "advancement", "type": "event"}
            ],
            "item_pool": [{"name": "Lamp", "count": 1}],
            "events": [{"location": "Boss", "item": "Victory"}],
            "dungeons": [{"name": "Dungeon", "regions": ["Dungeon"], "small_keys": ["Small Key"]}],
            "goal": {"has": "Victory"}
        }))
        .unwrap()
    }

    #[test]
    fn test_make_and_or() {
        assert_eq!(Rule::make_and(vec![]), Rule::Free);
        assert_eq!(
            Rule::make_and(vec![Rule::Free, Rule::has("Bow"), Rule::Never]),
            Rule::Never
        );
        assert_eq!(
            Rule::make_and(vec![
                Rule::has("Bow"),
                Rule::make_and(vec![Rule::has("Lamp"), Rule::has("Hammer")])
            ]),
            Rule::And(vec![Rule::has("Bow"), Rule::has("Lamp"), Rule::has("Hammer")])
        );
        assert_eq!(Rule::make_or(vec![Rule::Never]), Rule::Never);
        assert_eq!(Rule::make_or(vec![Rule::has("Bow"), Rule::Free]), Rule::Free);
        assert_eq!(Rule::make_or(vec![Rule::Never, Rule::has("Bow")]), Rule::has("Bow"));
    }

    #[test]
    fn test_rule_evaluate() {
        let mut view = TestView {
            items: HashMap::new(),
            regions: HashSet::new(),
        };
        let rule = Rule::make_or(vec![
            Rule::has_count("Bottle", 2),
            Rule::make_and(vec![Rule::has("Flippers"), Rule::Region(3)]),
        ]);
        assert!(!rule.evaluate(&view));
        view.items.insert("Bottle".to_string(), 1);
        assert!(!rule.evaluate(&view));
        view.items.insert("Flippers".to_string(), 1);
        assert!(!rule.evaluate(&view));
        view.regions.insert(3);
        assert!(rule.evaluate(&view));
        view.regions.clear();
        view.items.insert("Bottle".to_string(), 2);
        assert!(rule.evaluate(&view));
        assert!(Rule::has_count("Anything", 0).evaluate(&view));
    }

    #[test]
    fn test_closure_predicate() {
        let access = Access::new(|state: &dyn LogicView| state.has("Hookshot"));
        let mut view = TestView {
            items: HashMap::new(),
            regions: HashSet::new(),
        };
        assert!(!access.evaluate(&view));
        view.items.insert("Hookshot".to_string(), 1);
        assert!(access.evaluate(&view));
    }

    #[test]
    fn test_from_def() {
        let world = World::from_def(&sample_def()).unwrap();
        assert_eq!(world.regions.len(), 3);
        assert_eq!(world.start_region, 0);
        assert_eq!(world.regions[2].dungeon, Some(0));
        assert_eq!(world.regions[1].exits, vec![1]);
        assert_eq!(world.itempool.len(), 1);
        assert_eq!(world.itempool[0].code, Some(18));

        let boss = world.get_location_id("Boss").unwrap();
        assert!(world.locations[boss].event);
        assert_eq!(
            world.locations[boss].item.as_ref().map(|i| i.name.as_str()),
            Some("Victory")
        );
        // Event locations are not part of the fill bookkeeping:
        assert_eq!(world.unfilled_locations(), vec![0, 1]);
        assert_eq!(world.dungeons[0].small_keys[0].dungeon, Some(0));
    }

    #[test]
    fn test_from_def_unknown_names() {
        let mut def = sample_def();
        def.locations[0].region = "Nowhere".to_string();
        assert!(World::from_def(&def).is_err());

        let mut def = sample_def();
        def.entrances[1].rule = RuleDef::CanReach("Nowhere".to_string());
        assert!(World::from_def(&def).is_err());

        let mut def = sample_def();
        def.item_pool[0].name = "Unknown Item".to_string();
        assert!(World::from_def(&def).is_err());
    }

    #[test]
    fn test_item_allowed() {
        let mut world = World::from_def(&sample_def()).unwrap();
        let key = world.create_item("Small Key").unwrap();
        let lamp = world.create_item("Lamp").unwrap();
        let chest = world.get_location_id("Chest").unwrap();
        let dungeon_chest = world.get_location_id("Dungeon Chest").unwrap();
        assert!(!world.item_allowed(chest, &key));
        assert!(world.item_allowed(dungeon_chest, &key));
        assert!(world.item_allowed(chest, &lamp));

        world.keysanity = true;
        assert!(world.item_allowed(chest, &key));

        world.locations[chest].item_rule = ItemRule::Forbid(vec!["Lamp".to_string()]);
        assert!(!world.item_allowed(chest, &lamp));
        world.locations[chest].item_rule = ItemRule::Only(vec!["Lamp".to_string()]);
        assert!(world.item_allowed(chest, &lamp));
        assert!(!world.item_allowed(chest, &key));
    }
}
