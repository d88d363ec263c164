use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Logical endpoints of the site under test.
///
/// Paths live here and nowhere else; callers refer to endpoints by variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Home,
    Posts,
    Categories,
    Tags,
    About,
    Feed,
}

impl Route {
    pub const ALL: [Route; 6] = [
        Route::Home,
        Route::Posts,
        Route::Categories,
        Route::Tags,
        Route::About,
        Route::Feed,
    ];

    pub const fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Posts => "/year-archive/",
            Route::Categories => "/categories/",
            Route::Tags => "/tags/",
            Route::About => "/about/",
            Route::Feed => "/feed.xml",
        }
    }

    /// Registry key, as used in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            Route::Home => "home",
            Route::Posts => "posts",
            Route::Categories => "categories",
            Route::Tags => "tags",
            Route::About => "about",
            Route::Feed => "feed",
        }
    }

    /// Human label used in check names.
    pub const fn label(self) -> &'static str {
        match self {
            Route::Home => "Home",
            Route::Posts => "Posts",
            Route::Categories => "Categories",
            Route::Tags => "Tags",
            Route::About => "About",
            Route::Feed => "RSS Feed",
        }
    }

    /// Looks a route up by its registry key, ignoring ASCII case.
    pub fn lookup(name: &str) -> Result<Route> {
        Route::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::UnknownRoute(name.to_owned()))
    }
}

impl FromStr for Route {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Route::lookup(s)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_names() {
        assert_eq!(Route::lookup("about").unwrap(), Route::About);
        assert_eq!(Route::lookup("FEED").unwrap(), Route::Feed);
        assert_eq!("posts".parse::<Route>().unwrap().path(), "/year-archive/");
    }

    #[test]
    fn unknown_name_fails_loudly() {
        let err = Route::lookup("contact").unwrap_err();
        assert!(matches!(err, Error::UnknownRoute(ref name) if name == "contact"));
    }

    #[test]
    fn every_route_round_trips_through_its_name() {
        for route in Route::ALL {
            assert_eq!(Route::lookup(route.name()).unwrap(), route);
            assert!(route.path().starts_with('/'));
        }
    }
}
