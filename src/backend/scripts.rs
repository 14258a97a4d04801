//! Lua scripts run by [`super::RedisBackend`].
//!
//! Each script is one atomic unit on the server. Entries are JSON, and
//! `cjson` reads their `entity_sets` array to find index memberships.
//!
//! [`super::MemoryBackend`] mirrors each script in one critical section. The
//! scripts themselves run only in `tests/redis_integration_tests.rs`.

/// KEYS[1] entry key.
/// ARGV[1] bytes read earlier, ARGV[2] new bytes, ARGV[3] ttl ms (0 = keep).
pub const TOUCH_ENTRY: &str = r"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
    return 0
end
local ttl = tonumber(ARGV[3])
if ttl > 0 then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ttl)
else
    redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
end
return 1
";

/// KEYS[1] entry key, KEYS[2..] index keys.
/// ARGV[1] member, ARGV[2] payload, ARGV[3] ttl ms (0 = none), ARGV[4] index prefix.
pub const PUT_ENTRY: &str = r"
local entry_key = KEYS[1]
local member = ARGV[1]
local ttl = tonumber(ARGV[3])
local index_prefix = ARGV[4]

local wanted = {}
for i = 2, #KEYS do
    wanted[KEYS[i]] = true
end

local previous = redis.call('GET', entry_key)
if previous then
    local ok, entry = pcall(cjson.decode, previous)
    if ok and type(entry) == 'table' and type(entry.entity_sets) == 'table' then
        for _, name in ipairs(entry.entity_sets) do
            local index_key = index_prefix .. name
            if not wanted[index_key] then
                redis.call('SREM', index_key, member)
            end
        end
    end
end

for i = 2, #KEYS do
    redis.call('SADD', KEYS[i], member)
end

if ttl > 0 then
    redis.call('SET', entry_key, ARGV[2], 'PX', ttl)
else
    redis.call('SET', entry_key, ARGV[2])
end
return 1
";

/// KEYS[1] entry key, KEYS[2..] index keys. ARGV[1] member.
pub const REMOVE_ENTRY: &str = r"
for i = 2, #KEYS do
    redis.call('SREM', KEYS[i], ARGV[1])
end
return redis.call('DEL', KEYS[1])
";

/// KEYS index keys. ARGV[1] entry prefix, ARGV[2] index prefix.
pub const SWEEP_INDEXES: &str = r"
local entry_prefix = ARGV[1]
local index_prefix = ARGV[2]
local removed = {}
local seen = {}

for _, index_key in ipairs(KEYS) do
    for _, member in ipairs(redis.call('SMEMBERS', index_key)) do
        if not seen[member] then
            seen[member] = true
            local entry_key = entry_prefix .. member
            local raw = redis.call('GET', entry_key)
            if raw then
                local ok, entry = pcall(cjson.decode, raw)
                if ok and type(entry) == 'table' and type(entry.entity_sets) == 'table' then
                    for _, name in ipairs(entry.entity_sets) do
                        redis.call('SREM', index_prefix .. name, member)
                    end
                end
                redis.call('DEL', entry_key)
                table.insert(removed, member)
            end
        end
    end
    redis.call('DEL', index_key)
end
return removed
";

/// KEYS[1] index key. ARGV[1] entry prefix.
pub const PRUNE_INDEX: &str = r"
local pruned = 0
for _, member in ipairs(redis.call('SMEMBERS', KEYS[1])) do
    if redis.call('EXISTS', ARGV[1] .. member) == 0 then
        redis.call('SREM', KEYS[1], member)
        pruned = pruned + 1
    end
end
return pruned
";

/// KEYS lock keys. ARGV[1] token, ARGV[2] lease ms.
pub const LOCK_ACQUIRE: &str = r"
for i = 1, #KEYS do
    if redis.call('EXISTS', KEYS[i]) == 1 then
        return 0
    end
end
for i = 1, #KEYS do
    redis.call('SET', KEYS[i], ARGV[1], 'PX', ARGV[2])
end
return 1
";

/// KEYS lock keys. ARGV[1] token.
pub const LOCK_RELEASE: &str = r"
local released = 0
for i = 1, #KEYS do
    if redis.call('GET', KEYS[i]) == ARGV[1] then
        redis.call('DEL', KEYS[i])
        released = released + 1
    end
end
return released
";
