use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    XPath(String),
}

/// Opaque handle to an element of the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

/// Top-left corner of an element relative to the document, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// The browser capabilities the export crawl needs.
pub trait Browser {
    fn navigate(&mut self, url: &str) -> anyhow::Result<()>;
    fn maximize_window(&mut self) -> anyhow::Result<()>;
    fn find_element(&mut self, locator: &Locator) -> anyhow::Result<ElementRef>;
    fn element_position(&mut self, element: &ElementRef) -> anyhow::Result<Position>;
    fn execute_script(&mut self, script: &str) -> anyhow::Result<()>;
    /// Poll until the located element is displayed and enabled. `Ok(None)` on timeout.
    fn wait_for_clickable(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> anyhow::Result<Option<ElementRef>>;
    fn click(&mut self, element: &ElementRef) -> anyhow::Result<()>;
    /// End the session. Must tolerate being called on a session that already failed.
    fn quit(&mut self) -> anyhow::Result<()>;
}

impl<B: Browser + ?Sized> Browser for Box<B> {
    fn navigate(&mut self, url: &str) -> anyhow::Result<()> {
        (**self).navigate(url)
    }

    fn maximize_window(&mut self) -> anyhow::Result<()> {
        (**self).maximize_window()
    }

    fn find_element(&mut self, locator: &Locator) -> anyhow::Result<ElementRef> {
        (**self).find_element(locator)
    }

    fn element_position(&mut self, element: &ElementRef) -> anyhow::Result<Position> {
        (**self).element_position(element)
    }

    fn execute_script(&mut self, script: &str) -> anyhow::Result<()> {
        (**self).execute_script(script)
    }

    fn wait_for_clickable(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> anyhow::Result<Option<ElementRef>> {
        (**self).wait_for_clickable(locator, timeout)
    }

    fn click(&mut self, element: &ElementRef) -> anyhow::Result<()> {
        (**self).click(element)
    }

    fn quit(&mut self) -> anyhow::Result<()> {
        (**self).quit()
    }
}

/// Scoped ownership of a browser session: the session is quit when the guard is dropped,
/// whichever way the scope is left.
pub struct SessionGuard<B: Browser> {
    browser: B,
}

impl<B: Browser> SessionGuard<B> {
    pub fn new(browser: B) -> Self {
        Self { browser }
    }
}

impl<B: Browser> Deref for SessionGuard<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.browser
    }
}

impl<B: Browser> DerefMut for SessionGuard<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.browser
    }
}

impl<B: Browser> Drop for SessionGuard<B> {
    fn drop(&mut self) {
        log::debug!("Closing browser session");
        if let Err(err) = self.browser.quit() {
            log::warn!("Could not close browser session: {:#}", err);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use anyhow::anyhow;

    use super::{Browser, ElementRef, Locator, Position};

    /// Scripted browser that records every call into a log shared with the test.
    #[derive(Debug, Default)]
    pub struct FakeBrowser {
        pub calls: Rc<RefCell<Vec<String>>>,
        pub element_y: f64,
        pub clickable: bool,
        pub fail_click: bool,
    }

    impl FakeBrowser {
        pub fn new() -> Self {
            Self {
                element_y: 450.0,
                clickable: true,
                ..Default::default()
            }
        }

        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl Browser for FakeBrowser {
        fn navigate(&mut self, url: &str) -> anyhow::Result<()> {
            self.record(format!("navigate {}", url));
            Ok(())
        }

        fn maximize_window(&mut self) -> anyhow::Result<()> {
            self.record("maximize".to_string());
            Ok(())
        }

        fn find_element(&mut self, locator: &Locator) -> anyhow::Result<ElementRef> {
            self.record(format!("find {:?}", locator));
            Ok(ElementRef("element-1".to_string()))
        }

        fn element_position(&mut self, element: &ElementRef) -> anyhow::Result<Position> {
            self.record(format!("position {}", element.0));
            Ok(Position {
                x: 0.0,
                y: self.element_y,
            })
        }

        fn execute_script(&mut self, script: &str) -> anyhow::Result<()> {
            self.record(format!("script {}", script));
            Ok(())
        }

        fn wait_for_clickable(
            &mut self,
            locator: &Locator,
            timeout: Duration,
        ) -> anyhow::Result<Option<ElementRef>> {
            self.record(format!("wait {:?} {}s", locator, timeout.as_secs()));
            Ok(self.clickable.then(|| ElementRef("button".to_string())))
        }

        fn click(&mut self, element: &ElementRef) -> anyhow::Result<()> {
            self.record(format!("click {}", element.0));
            if self.fail_click {
                return Err(anyhow!("element click intercepted"));
            }
            Ok(())
        }

        fn quit(&mut self) -> anyhow::Result<()> {
            self.record("quit".to_string());
            Ok(())
        }
    }
}
