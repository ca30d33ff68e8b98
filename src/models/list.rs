/// Sub-collection of `user/{uid}` holding the user's lists.
pub const LIST_COLLECTION: &str = "list";

/// `type` of the lists created by bootstrap; user-created lists carry other values.
pub const SYSTEM_LIST_TYPE: &str = "system";

/// Lists every user owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemList {
    Favorites,
    Watched,
    Watchlist,
}

impl SystemList {
    pub const ALL: [SystemList; 3] = [SystemList::Favorites, SystemList::Watched, SystemList::Watchlist];

    pub fn id(self) -> &'static str {
        match self {
            SystemList::Favorites => "favorites",
            SystemList::Watched => "watched",
            SystemList::Watchlist => "watchlist",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SystemList::Favorites => "Favorites",
            SystemList::Watched => "Watched",
            SystemList::Watchlist => "Watchlist",
        }
    }
}
