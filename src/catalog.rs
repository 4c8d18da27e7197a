//! Trivia content loading, with a built-in fallback set of categories.

use std::{collections::HashSet, env, fs, io::ErrorKind, path::PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::{MediaKind, TriviaItemEntity};

/// Default location of the catalog file.
const DEFAULT_CATALOG_PATH: &str = "config/catalog.json";
/// Environment variable that overrides [`DEFAULT_CATALOG_PATH`].
const CATALOG_PATH_ENV: &str = "CINESCORE_CATALOG_PATH";

/// Immutable trivia catalog keyed by category name.
#[derive(Debug, Clone)]
pub struct Catalog {
    categories: IndexMap<String, Vec<TriviaItemEntity>>,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    categories: IndexMap<String, Vec<TriviaItemEntity>>,
}

impl From<RawCatalog> for Catalog {
    fn from(raw: RawCatalog) -> Self {
        let categories = raw
            .categories
            .into_iter()
            .map(|(name, items)| {
                let mut seen = HashSet::new();
                let before = items.len();
                let items: Vec<_> = items
                    .into_iter()
                    .filter(|item| seen.insert(item.id.clone()))
                    .collect();
                if items.len() != before {
                    warn!(
                        category = %name,
                        dropped = before - items.len(),
                        "duplicate item ids in catalog category; keeping first occurrences"
                    );
                }
                (name, items)
            })
            .collect();
        Self { categories }
    }
}

impl Catalog {
    /// Load the catalog from disk, falling back to [`Catalog::builtin`].
    pub fn load() -> Self {
        let path = resolve_catalog_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(catalog) => {
                    info!(
                        path = %path.display(),
                        categories = catalog.categories.len(),
                        "loaded trivia catalog"
                    );
                    catalog
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse catalog; falling back to built-in categories"
                    );
                    Self::builtin()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "catalog file not found; using built-in categories"
                );
                Self::builtin()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read catalog; falling back to built-in categories"
                );
                Self::builtin()
            }
        }
    }

    /// Parse a catalog document of the form `{"categories": {"name": [item, ...]}}`.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawCatalog>(contents).map(Into::into)
    }

    /// Build a catalog from already-constructed categories.
    pub fn from_categories(categories: IndexMap<String, Vec<TriviaItemEntity>>) -> Self {
        RawCatalog { categories }.into()
    }

    /// Items of `category`, or `None` when the category is unknown.
    pub fn items(&self, category: &str) -> Option<&[TriviaItemEntity]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    /// Category names with their item counts, in catalog order.
    pub fn summaries(&self) -> impl Iterator<Item = (&str, usize)> {
        self.categories
            .iter()
            .map(|(name, items)| (name.as_str(), items.len()))
    }

    /// Categories shipped with the binary.
    pub fn builtin() -> Self {
        use MediaKind::{Movie, Tv};

        let categories = [
            (
                "classics",
                vec![
                    item("classics-godfather", "The Godfather Waltz", "Nino Rota", "The Godfather", 1972, Movie),
                    item("classics-oz", "Over the Rainbow", "Judy Garland", "The Wizard of Oz", 1939, Movie),
                    item("classics-casablanca", "As Time Goes By", "Dooley Wilson", "Casablanca", 1942, Movie),
                    item("classics-moon-river", "Moon River", "Henry Mancini", "Breakfast at Tiffany's", 1961, Movie),
                    item("classics-graduate", "Mrs. Robinson", "Simon & Garfunkel", "The Graduate", 1967, Movie),
                    item("classics-rocky", "Gonna Fly Now", "Bill Conti", "Rocky", 1976, Movie),
                    item("classics-ghostbusters", "Ghostbusters", "Ray Parker Jr.", "Ghostbusters", 1984, Movie),
                    item("classics-footloose", "Footloose", "Kenny Loggins", "Footloose", 1984, Movie),
                ],
            ),
            (
                "scifi",
                vec![
                    item("scifi-new-hope", "Main Title", "John Williams", "Star Wars: A New Hope", 1977, Movie),
                    item("scifi-blade-runner", "Blade Runner Blues", "Vangelis", "Blade Runner", 1982, Movie),
                    item("scifi-interstellar", "Cornfield Chase", "Hans Zimmer", "Interstellar", 2014, Movie),
                    item("scifi-2001", "Also Sprach Zarathustra", "Richard Strauss", "2001: A Space Odyssey", 1968, Movie),
                    item("scifi-terminator", "Terminator Theme", "Brad Fiedel", "The Terminator", 1984, Movie),
                    item("scifi-et", "Flying Theme", "John Williams", "E.T. the Extra-Terrestrial", 1982, Movie),
                    item("scifi-jurassic", "Theme from Jurassic Park", "John Williams", "Jurassic Park", 1993, Movie),
                    item("scifi-bttf", "Back to the Future", "Alan Silvestri", "Back to the Future", 1985, Movie),
                ],
            ),
            (
                "action",
                vec![
                    item("action-pirates", "He's a Pirate", "Klaus Badelt", "Pirates of the Caribbean: The Curse of the Black Pearl", 2003, Movie),
                    item("action-mi", "Theme from Mission: Impossible", "Lalo Schifrin", "Mission: Impossible", 1996, Movie),
                    item("action-raiders", "Raiders March", "John Williams", "Raiders of the Lost Ark", 1981, Movie),
                    item("action-dr-no", "James Bond Theme", "Monty Norman", "Dr. No", 1962, Movie),
                    item("action-gladiator", "Now We Are Free", "Hans Zimmer", "Gladiator", 2000, Movie),
                    item("action-dark-knight", "Why So Serious?", "Hans Zimmer", "The Dark Knight", 2008, Movie),
                    item("action-top-gun", "Top Gun Anthem", "Harold Faltermeyer", "Top Gun", 1986, Movie),
                ],
            ),
            (
                "animation",
                vec![
                    item("animation-lion-king", "Circle of Life", "Elton John", "The Lion King", 1994, Movie),
                    item("animation-mermaid", "Under the Sea", "Samuel E. Wright", "The Little Mermaid", 1989, Movie),
                    item("animation-beauty", "Be Our Guest", "Jerry Orbach", "Beauty and the Beast", 1991, Movie),
                    item("animation-aladdin", "A Whole New World", "Brad Kane", "Aladdin", 1992, Movie),
                    item("animation-toy-story", "You've Got a Friend in Me", "Randy Newman", "Toy Story", 1995, Movie),
                    item("animation-shrek", "All Star", "Smash Mouth", "Shrek", 2001, Movie),
                    item("animation-frozen", "Let It Go", "Idina Menzel", "Frozen", 2013, Movie),
                ],
            ),
            (
                "tv",
                vec![
                    item("tv-got", "Game of Thrones Main Title", "Ramin Djawadi", "Game of Thrones", 2011, Tv),
                    item("tv-stranger-things", "Stranger Things Theme", "Kyle Dixon", "Stranger Things", 2016, Tv),
                    item("tv-breaking-bad", "Breaking Bad Theme", "Dave Porter", "Breaking Bad", 2008, Tv),
                    item("tv-friends", "I'll Be There for You", "The Rembrandts", "Friends", 1994, Tv),
                    item("tv-seinfeld", "Seinfeld Theme", "Jonathan Wolff", "Seinfeld", 1989, Tv),
                    item("tv-cheers", "Where Everybody Knows Your Name", "Gary Portnoy", "Cheers", 1982, Tv),
                    item("tv-simpsons", "The Simpsons Theme", "Danny Elfman", "The Simpsons", 1989, Tv),
                ],
            ),
        ];

        Self {
            categories: categories
                .into_iter()
                .map(|(name, items)| (name.to_owned(), items))
                .collect(),
        }
    }
}

fn item(
    id: &str,
    title: &str,
    artist: &str,
    work: &str,
    year: u16,
    media_kind: MediaKind,
) -> TriviaItemEntity {
    TriviaItemEntity {
        id: id.to_owned(),
        title: title.to_owned(),
        artist: artist.to_owned(),
        work: work.to_owned(),
        year: Some(year),
        media_kind,
    }
}

/// Resolve the catalog path taking the environment override into account.
fn resolve_catalog_path() -> PathBuf {
    env::var_os(CATALOG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH))
}
