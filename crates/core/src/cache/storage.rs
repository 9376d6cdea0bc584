//! Named cache stores and the store registry.
//!
//! [`CacheStorage`] is the registry (open, list, delete stores, search across
//! all of them); [`Cache`] is a handle to one named store. Handles are cheap
//! to clone and any number of them may refer to the same store.

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection};

use super::connection::CacheDb;
use super::hash::compute_request_key;
use crate::Error;
use crate::message::{Request, Response};

/// Registry of named cache stores.
#[derive(Clone, Debug)]
pub struct CacheStorage {
    db: CacheDb,
    max_entry_bytes: usize,
}

/// Handle to a single named store.
#[derive(Clone, Debug)]
pub struct Cache {
    name: String,
    db: CacheDb,
    max_entry_bytes: usize,
}

/// A response flattened for storage.
struct EncodedEntry {
    key_hash: String,
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
}

impl EncodedEntry {
    /// Consume the response body and check it against the entry limit.
    fn encode(request: &Request, mut response: Response, max_entry_bytes: usize) -> Result<Self, Error> {
        if !request.is_get() {
            return Err(Error::InvalidInput(format!("cannot cache {} request", request.method())));
        }

        let body = response.bytes()?;
        if body.len() > max_entry_bytes {
            return Err(Error::QuotaExceeded { size: body.len(), limit: max_entry_bytes });
        }

        // Values are kept as raw bytes; not every valid header value is visible ASCII.
        let headers: Vec<(String, Vec<u8>)> = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();
        let headers_json =
            serde_json::to_string(&headers).map_err(|e| Error::InvalidInput(format!("unencodable headers: {e}")))?;

        let method = request.method().as_str().to_string();
        let url = request.url().as_str().to_string();
        Ok(Self {
            key_hash: compute_request_key(&method, &url),
            method,
            url,
            status: i64::from(response.status().as_u16()),
            headers_json,
            body: body.to_vec(),
        })
    }

    fn upsert(&self, conn: &Connection, cache_name: &str, stored_at: &str) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO entries (cache_name, key_hash, method, url, status, headers_json, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(cache_name, key_hash) DO UPDATE SET
                 status = excluded.status,
                 headers_json = excluded.headers_json,
                 body = excluded.body,
                 stored_at = excluded.stored_at",
            params![
                cache_name,
                &self.key_hash,
                &self.method,
                &self.url,
                self.status,
                &self.headers_json,
                &self.body,
                stored_at,
            ],
        )?;
        Ok(())
    }
}

/// Rebuild a response from a stored row.
fn decode_entry(status: i64, headers_json: &str, body: Vec<u8>) -> Result<Response, Error> {
    let status = u16::try_from(status)
        .ok()
        .and_then(|s| StatusCode::from_u16(s).ok())
        .ok_or_else(|| Error::CorruptEntry(format!("invalid status {status}")))?;

    let pairs: Vec<(String, Vec<u8>)> =
        serde_json::from_str(headers_json).map_err(|e| Error::CorruptEntry(format!("headers: {e}")))?;
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        let value = HeaderValue::from_bytes(&value).map_err(|e| Error::CorruptEntry(e.to_string()))?;
        headers.append(name, value);
    }

    Ok(Response::new(status, headers, body))
}

fn ensure_cache(conn: &Connection, name: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

impl CacheStorage {
    /// Create a registry over an open database with no per-entry size limit.
    pub fn new(db: CacheDb) -> Self {
        Self { db, max_entry_bytes: usize::MAX }
    }

    /// Reject entries whose body exceeds `limit` bytes.
    pub fn with_max_entry_bytes(mut self, limit: usize) -> Self {
        self.max_entry_bytes = limit;
        self
    }

    /// Open a store by name, creating it if absent.
    pub async fn open(&self, name: &str) -> Result<Cache, Error> {
        let owned = name.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                ensure_cache(conn, &owned)?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(Cache { name: name.to_string(), db: self.db.clone(), max_entry_bytes: self.max_entry_bytes })
    }

    /// Check whether a store exists.
    pub async fn has(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a store and all its entries.
    ///
    /// Returns false if no store had that name.
    pub async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of all stores, in creation order.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        self.db
            .conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Look a request up in every store, oldest store first.
    pub async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error> {
        if !request.is_get() {
            return Ok(None);
        }
        let key_hash = compute_request_key(request.method().as_str(), request.url().as_str());
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(i64, String, Vec<u8>)>, Error> {
                let result = conn.query_row(
                    "SELECT e.status, e.headers_json, e.body
                     FROM entries e
                     INNER JOIN caches c ON c.name = e.cache_name
                     WHERE e.key_hash = ?1
                     ORDER BY c.rowid
                     LIMIT 1",
                    params![key_hash],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(|(status, headers_json, body)| decode_entry(status, &headers_json, body))
            .transpose()
    }
}

impl Cache {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the stored response for a request.
    ///
    /// A miss is `Ok(None)`, never an error.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        if !request.is_get() {
            return Ok(None);
        }
        let name = self.name.clone();
        let key_hash = compute_request_key(request.method().as_str(), request.url().as_str());
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(i64, String, Vec<u8>)>, Error> {
                let result = conn.query_row(
                    "SELECT status, headers_json, body FROM entries WHERE cache_name = ?1 AND key_hash = ?2",
                    params![name, key_hash],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(|(status, headers_json, body)| decode_entry(status, &headers_json, body))
            .transpose()
    }

    /// Store a response, replacing any entry for the same request.
    ///
    /// Consumes the response body; duplicate it first if the caller still needs it.
    pub async fn put(&self, request: &Request, response: Response) -> Result<(), Error> {
        let entry = EncodedEntry::encode(request, response, self.max_entry_bytes)?;
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let stored_at = chrono::Utc::now().to_rfc3339();
                let tx = conn.transaction()?;
                ensure_cache(&tx, &name)?;
                entry.upsert(&tx, &name, &stored_at)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store a batch of responses in one transaction.
    ///
    /// Either every entry is written or none is.
    pub async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), Error> {
        let encoded = entries
            .into_iter()
            .map(|(request, response)| EncodedEntry::encode(&request, response, self.max_entry_bytes))
            .collect::<Result<Vec<_>, _>>()?;
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let stored_at = chrono::Utc::now().to_rfc3339();
                let tx = conn.transaction()?;
                ensure_cache(&tx, &name)?;
                for entry in &encoded {
                    entry.upsert(&tx, &name, &stored_at)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the entry for a request. Returns false on a miss.
    pub async fn delete(&self, request: &Request) -> Result<bool, Error> {
        let name = self.name.clone();
        let key_hash = compute_request_key(request.method().as_str(), request.url().as_str());
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE cache_name = ?1 AND key_hash = ?2",
                    params![name, key_hash],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in this store.
    pub async fn len(&self) -> Result<usize, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE cache_name = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }

    /// URLs of the requests stored in this store, sorted.
    pub async fn urls(&self) -> Result<Vec<String>, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE cache_name = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Destination;
    use http::header;

    fn get(url: &str) -> Request {
        Request::parse("GET", url, Destination::Other).unwrap()
    }

    fn text_response(body: &str) -> Response {
        Response::with_content_type("text/plain", body.to_string())
    }

    async fn storage() -> CacheStorage {
        CacheStorage::new(CacheDb::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let caches = storage().await;
        let a = caches.open("runtime").await.unwrap();
        let b = caches.open("runtime").await.unwrap();

        a.put(&get("https://example.com/a.js"), text_response("a")).await.unwrap();

        let mut hit = b.match_request(&get("https://example.com/a.js")).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "a");
        assert_eq!(caches.keys().await.unwrap(), vec!["runtime".to_string()]);
    }

    #[tokio::test]
    async fn test_put_match_round_trip() {
        let caches = storage().await;
        let cache = caches.open("runtime").await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.append("x-trace", HeaderValue::from_static("one"));
        headers.append("x-trace", HeaderValue::from_static("two"));
        let response = Response::new(StatusCode::CREATED, headers.clone(), "{\"ok\":true}");

        cache.put(&get("https://example.com/data.json"), response).await.unwrap();

        let mut hit = cache.match_request(&get("https://example.com/data.json")).await.unwrap().unwrap();
        assert_eq!(hit.status(), StatusCode::CREATED);
        assert_eq!(hit.headers(), &headers);
        assert_eq!(hit.text().unwrap(), "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_round_trip_keeps_opaque_header_values() {
        let caches = storage().await;
        let cache = caches.open("runtime").await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_bytes(b"attachment; filename=\"caf\xe9.txt\"").unwrap(),
        );
        headers.insert("x-plain", HeaderValue::from_static("ok"));
        let response = Response::new(StatusCode::OK, headers.clone(), "menu");

        cache.put(&get("https://example.com/menu.txt"), response).await.unwrap();

        let hit = cache.match_request(&get("https://example.com/menu.txt")).await.unwrap().unwrap();
        assert_eq!(hit.headers(), &headers);
        assert_eq!(
            hit.headers().get(header::CONTENT_DISPOSITION).unwrap().as_bytes(),
            b"attachment; filename=\"caf\xe9.txt\""
        );
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let caches = storage().await;
        let cache = caches.open("runtime").await.unwrap();
        let request = get("https://example.com/script.js");

        cache.put(&request, text_response("old")).await.unwrap();
        cache.put(&request, text_response("new")).await.unwrap();

        let mut hit = cache.match_request(&request).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "new");
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_match_miss_is_none() {
        let caches = storage().await;
        let cache = caches.open("runtime").await.unwrap();
        assert!(cache.match_request(&get("https://example.com/nope")).await.unwrap().is_none());
        assert!(caches.match_any(&get("https://example.com/nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let caches = storage().await;
        let cache = caches.open("runtime").await.unwrap();
        let request = Request::parse("POST", "https://example.com/form", Destination::Other).unwrap();
        let result = cache.put(&request, text_response("x")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_put_rejects_consumed_body() {
        let caches = storage().await;
        let cache = caches.open("runtime").await.unwrap();
        let mut response = text_response("x");
        response.bytes().unwrap();
        let result = cache.put(&get("https://example.com/x"), response).await;
        assert!(matches!(result, Err(Error::BodyUsed)));
    }

    #[tokio::test]
    async fn test_put_quota_exceeded() {
        let caches = storage().await.with_max_entry_bytes(4);
        let cache = caches.open("runtime").await.unwrap();
        let result = cache.put(&get("https://example.com/big"), text_response("too large")).await;
        assert!(matches!(result, Err(Error::QuotaExceeded { size: 9, limit: 4 })));
        assert!(cache.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_put_all_is_atomic() {
        let caches = storage().await.with_max_entry_bytes(4);
        let cache = caches.open("precache-v1").await.unwrap();

        let batch = vec![
            (get("https://example.com/"), text_response("ok")),
            (get("https://example.com/huge"), text_response("way too large")),
        ];
        assert!(cache.put_all(batch).await.is_err());
        assert!(cache.is_empty().await.unwrap());

        let batch = vec![
            (get("https://example.com/"), text_response("a")),
            (get("https://example.com/index.html"), text_response("b")),
        ];
        cache.put_all(batch).await.unwrap();
        assert_eq!(
            cache.urls().await.unwrap(),
            vec!["https://example.com/".to_string(), "https://example.com/index.html".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_store_cascades() {
        let caches = storage().await;
        let v1 = caches.open("precache-v1").await.unwrap();
        caches.open("runtime").await.unwrap();
        v1.put(&get("https://example.com/"), text_response("home")).await.unwrap();

        assert!(caches.delete("precache-v1").await.unwrap());
        assert!(!caches.delete("precache-v1").await.unwrap());
        assert!(!caches.has("precache-v1").await.unwrap());
        assert_eq!(caches.keys().await.unwrap(), vec!["runtime".to_string()]);
        assert!(caches.match_any(&get("https://example.com/")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_any_prefers_oldest_store() {
        let caches = storage().await;
        let precache = caches.open("precache-v1").await.unwrap();
        let runtime = caches.open("runtime").await.unwrap();
        let request = get("https://example.com/logo.png");

        runtime.put(&request, text_response("runtime")).await.unwrap();
        precache.put(&request, text_response("precache")).await.unwrap();

        let mut hit = caches.match_any(&request).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "precache");
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let caches = storage().await;
        let cache = caches.open("runtime").await.unwrap();
        let request = get("https://example.com/a");
        cache.put(&request, text_response("a")).await.unwrap();

        assert!(cache.delete(&request).await.unwrap());
        assert!(!cache.delete(&request).await.unwrap());
        assert!(cache.match_request(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stores_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        {
            let caches = CacheStorage::new(CacheDb::open(&path).await.unwrap());
            let cache = caches.open("runtime").await.unwrap();
            cache.put(&get("https://example.com/a"), text_response("kept")).await.unwrap();
        }

        let caches = CacheStorage::new(CacheDb::open(&path).await.unwrap());
        assert!(caches.has("runtime").await.unwrap());
        let mut hit = caches.match_any(&get("https://example.com/a")).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "kept");
    }
}
